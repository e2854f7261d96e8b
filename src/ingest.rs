// Article ingestion: preprocessed articles from a JSON or JSONL file.
//
// The collector and preprocessor live upstream; by the time articles get
// here they carry `preprocessed_text` and a newspaper name. A file is
// either one JSON array or one JSON object per line.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::topics::document::{ArticleMeta, Document};

/// One article as written by the preprocessing step.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleRecord {
    pub article_id: String,
    pub newspaper: String,
    #[serde(default)]
    pub preprocessed_text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// ISO date or timestamp; only the `YYYY-MM-DD` prefix matters
    #[serde(default, alias = "published_date")]
    pub date: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
}

impl ArticleRecord {
    fn into_document(self) -> Result<Document> {
        if self.article_id.trim().is_empty() {
            anyhow::bail!("article has an empty article_id");
        }
        if self.newspaper.trim().is_empty() {
            anyhow::bail!("article '{}' has an empty newspaper", self.article_id);
        }
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(parse_article_date(raw).with_context(|| {
                format!("article '{}' has an unreadable date '{raw}'", self.article_id)
            })?),
            None => None,
        };

        let meta = ArticleMeta {
            title: self.title.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            date,
        };
        let doc = Document::new(self.article_id, self.newspaper, self.preprocessed_text).with_meta(meta);
        Ok(match self.embedding {
            Some(v) => doc.with_features(v),
            None => doc,
        })
    }
}

fn parse_article_date(raw: &str) -> Result<NaiveDate> {
    let prefix = raw.get(..10).unwrap_or(raw);
    Ok(NaiveDate::parse_from_str(prefix, "%Y-%m-%d")?)
}

/// Parse articles from file contents. A leading `[` means a JSON array;
/// anything else is read as JSON Lines (blank lines skipped).
pub fn parse_documents(contents: &str) -> Result<Vec<Document>> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        let records: Vec<ArticleRecord> =
            serde_json::from_str(trimmed).context("Failed to parse article array")?;
        return records
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_document().with_context(|| format!("Invalid article at index {i}")))
            .collect();
    }

    let mut documents = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ArticleRecord = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse article on line {}", lineno + 1))?;
        documents.push(
            record
                .into_document()
                .with_context(|| format!("Invalid article on line {}", lineno + 1))?,
        );
    }
    Ok(documents)
}

/// Load every article from a JSON / JSONL file.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read articles from {}", path.display()))?;
    let documents = parse_documents(&contents)
        .with_context(|| format!("Failed to load articles from {}", path.display()))?;
    info!(count = documents.len(), path = %path.display(), "Loaded articles");
    Ok(documents)
}

/// Split articles by run date.
///
/// When any article carries a date, each requested date gets the articles
/// published that day (undated ones are dropped). When none do, the whole
/// file belongs to the last requested date. Dates with no articles are
/// left out.
pub fn group_by_date(documents: &[Document], dates: &[NaiveDate]) -> Vec<(NaiveDate, Vec<Document>)> {
    let requested: BTreeSet<NaiveDate> = dates.iter().copied().collect();
    let any_dated = documents.iter().any(|d| d.meta.date.is_some());

    if !any_dated {
        return match requested.iter().next_back() {
            Some(&last) if !documents.is_empty() => vec![(last, documents.to_vec())],
            _ => Vec::new(),
        };
    }

    let undated = documents.iter().filter(|d| d.meta.date.is_none()).count();
    if undated > 0 {
        warn!(undated, "Skipping articles without a date");
    }

    requested
        .into_iter()
        .filter_map(|date| {
            let day: Vec<Document> = documents
                .iter()
                .filter(|d| d.meta.date == Some(date))
                .cloned()
                .collect();
            if day.is_empty() {
                warn!(%date, "No articles found for date");
                None
            } else {
                Some((date, day))
            }
        })
        .collect()
}

/// `days` days back from `end`, plus `end` itself, oldest first.
pub fn date_range(end: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..=days)
        .rev()
        .filter_map(|back| end.checked_sub_days(chrono::Days::new(back as u64)))
        .collect()
}
