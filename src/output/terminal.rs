// Colored terminal output for topic results and batch reports.
//
// All terminal-specific formatting lives here; main.rs only decides what
// to show.

use colored::Colorize;

use super::truncate_chars;
use crate::db::models::StoredResultSummary;
use crate::pipeline::JobReport;
use crate::topics::compose::TopicModelResult;

const BAR_WIDTH: usize = 20;
const ARTICLES_SHOWN: usize = 3;

/// A fixed-width bar for a proportion in [0, 1].
pub fn share_bar(proportion: f64, width: usize) -> String {
    let p = if proportion.is_finite() { proportion.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (p * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

/// Display one result: topics, their words, and how each newspaper covers them.
pub fn display_result(result: &TopicModelResult) {
    println!(
        "\n{}",
        format!(
            "=== {} / {}: {} topics, {} articles ===",
            result.run_date.format("%Y-%m-%d"),
            result.algorithm,
            result.num_topics,
            result.document_count
        )
        .bold()
    );
    println!(
        "  {} of {} articles assigned ({:.0}%)",
        result.assigned_count(),
        result.document_count,
        result.coverage() * 100.0
    );

    for topic in &result.topics {
        println!();
        println!(
            "  {} {}  {}",
            format!("#{}", topic.topic_id).cyan().bold(),
            topic.label.bold(),
            topic.words.join(", ").dimmed()
        );

        for (newspaper, count) in &topic.newspaper_counts {
            let stat = topic.source_stat(newspaper);
            let bar = share_bar(stat.proportion, BAR_WIDTH);
            let bar = if *count == 0 { bar.dimmed() } else { bar.green() };
            println!(
                "     {:<24} {} {:>3} ({:>5.1}%)",
                truncate_chars(newspaper, 24),
                bar,
                count,
                stat.proportion * 100.0
            );
        }

        for article in topic.articles.iter().take(ARTICLES_SHOWN) {
            let title = if article.title.is_empty() { &article.article_id } else { &article.title };
            println!("       - {} ({})", truncate_chars(title, 70), article.newspaper.dimmed());
        }
        if topic.articles.len() > ARTICLES_SHOWN {
            println!(
                "       {}",
                format!("... and {} more", topic.articles.len() - ARTICLES_SHOWN).dimmed()
            );
        }
    }
    println!();
}

/// Display one line per batch job.
pub fn display_batch(reports: &[JobReport]) {
    println!("\n{}", format!("=== Batch ({} runs) ===", reports.len()).bold());
    for report in reports {
        match &report.outcome {
            Ok(run) => {
                let note = if run.fell_back() {
                    format!(" (fell back to {})", run.ran).yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {:<16} {} topics, {}/{} articles assigned{}",
                    "ok".green(),
                    report.requested.to_string(),
                    run.result.num_topics,
                    run.result.assigned_count(),
                    run.result.document_count,
                    note
                );
            }
            Err(e) => {
                let tag = match e.kind() {
                    "empty_corpus" => "skip".yellow(),
                    _ => "FAIL".red().bold(),
                };
                println!("  {} {:<16} {}", tag, report.requested.to_string(), e);
            }
        }
    }
}

/// Display stored results as a table.
pub fn display_stored(summaries: &[StoredResultSummary]) {
    if summaries.is_empty() {
        println!("No results stored yet. Run `rassegna process --input <file>` first.");
        return;
    }

    println!(
        "  {:<10}  {:<9} {:>7} {:>9} {:>9}  {}",
        "Date".dimmed(),
        "Algorithm".dimmed(),
        "Topics".dimmed(),
        "Articles".dimmed(),
        "Assigned".dimmed(),
        "Stored".dimmed(),
    );
    println!("  {}", "-".repeat(70).dimmed());
    for s in summaries {
        println!(
            "  {:<10}  {:<9} {:>7} {:>9} {:>9}  {}",
            s.date.format("%Y-%m-%d"),
            s.algorithm,
            s.num_topics,
            s.num_articles,
            s.assigned_articles,
            s.stored_at.as_deref().unwrap_or("-")
        );
    }
}
