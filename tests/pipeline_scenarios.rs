// Pipeline tests: whole runs from documents to a composed result.
//
// Deterministic fake backends pin down exactly what the normalizer,
// assigner and aggregator see; the LDA runs check the same properties
// against a real algorithm.

use chrono::NaiveDate;

use rassegna::backends::{create_backend, BackendSettings};
use rassegna::db::{ResultStore, SqliteStore};
use rassegna::pipeline::{persist, run, run_with_fallback, RunContext};
use rassegna::topics::document::Document;
use rassegna::topics::traits::{Discovery, DocumentTopics, RawTopic};
use rassegna::topics::{Algorithm, PipelineError, TopicBackend};

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn settings() -> BackendSettings {
    BackendSettings {
        model_dir: std::env::temp_dir().join("rassegna-no-models"),
        ..BackendSettings::default()
    }
}

/// Returns a fixed discovery no matter the input.
struct Scripted {
    algorithm: Algorithm,
    outlier: Option<i64>,
    discovery: Discovery,
}

impl TopicBackend for Scripted {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
    fn outlier_label(&self) -> Option<i64> {
        self.outlier
    }
    fn discover(&self, _documents: &[&Document], _k: usize) -> anyhow::Result<Discovery> {
        Ok(self.discovery.clone())
    }
}

fn raw(topic_id: i64, words: &[(&str, f64)]) -> RawTopic {
    RawTopic {
        topic_id,
        terms: words.iter().map(|(w, x)| (w.to_string(), *x)).collect(),
    }
}

/// Ten articles: two from Alpha, eight from Beta, two clear themes.
fn alpha_beta_corpus() -> Vec<Document> {
    let politics = [
        "governo legge riforma parlamento voto",
        "parlamento governo ministro legge riforma",
        "ministro voto governo parlamento legge",
        "riforma legge governo ministro voto",
        "governo parlamento riforma voto ministro",
    ];
    let sport = [
        "calcio squadra campionato partita gol",
        "squadra partita allenatore calcio gol",
        "campionato calcio squadra tifosi partita",
        "gol partita calcio squadra allenatore",
        "tifosi campionato squadra calcio partita",
    ];
    let sources = ["Alpha", "Beta", "Beta", "Beta", "Beta", "Alpha", "Beta", "Beta", "Beta", "Beta"];
    politics
        .iter()
        .chain(sport.iter())
        .zip(sources)
        .enumerate()
        .map(|(i, (text, source))| Document::new(format!("art-{i}"), source, *text))
        .collect()
}

#[test]
fn lda_run_over_two_sources_keeps_counts_consistent() {
    let ctx = RunContext::new(run_date(), 2, alpha_beta_corpus());
    let backend = create_backend(Algorithm::Lda, &settings()).unwrap();
    let result = run(backend.as_ref(), &ctx).unwrap();

    assert_eq!(result.num_topics, 2);
    assert_eq!(result.topics.len(), 2);
    assert_eq!(result.document_count, 10);
    assert_eq!(result.algorithm, Algorithm::Lda);

    for topic in &result.topics {
        let by_source: u32 = topic.newspaper_counts.values().sum();
        assert_eq!(
            by_source as usize,
            topic.articles.len(),
            "topic {} counts {:?} vs {} articles",
            topic.topic_id,
            topic.newspaper_counts,
            topic.articles.len()
        );
        assert_eq!(topic.newspaper_counts.len(), 2, "both sources listed for every topic");
        for (source, weight) in &topic.newspaper_weights {
            assert!((0.0..=1.0).contains(weight), "{source} weight {weight}");
        }
    }

    // Every article has text, so every article is assigned once
    assert_eq!(result.assigned_count(), 10);
    let alpha_total: u32 = result.topics.iter().map(|t| t.source_stat("Alpha").count).sum();
    assert_eq!(alpha_total, 2);
}

#[tokio::test]
async fn empty_text_corpus_is_rejected_and_nothing_is_stored() {
    let docs = vec![
        Document::new("a", "Alpha", ""),
        Document::new("b", "Beta", "   "),
        Document::new("c", "Beta", "\n"),
    ];
    let ctx = RunContext::new(run_date(), 3, docs);
    let backend = create_backend(Algorithm::Nmf, &settings()).unwrap();

    let err = run(backend.as_ref(), &ctx).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyCorpus { supplied: 3 }), "{err:?}");

    // The run never reached persistence
    let store = SqliteStore::in_memory().unwrap();
    assert!(store.list_results().await.unwrap().is_empty());
}

#[test]
fn short_distribution_leaves_trailing_documents_unassigned() {
    let docs: Vec<Document> = (0..5)
        .map(|i| Document::new(format!("d{i}"), if i % 2 == 0 { "Alpha" } else { "Beta" }, "testo"))
        .collect();
    let backend = Scripted {
        algorithm: Algorithm::Lda,
        outlier: None,
        discovery: Discovery {
            topics: vec![raw(0, &[("governo", 2.0)]), raw(1, &[("calcio", 1.0)])],
            // Only three rows for five documents
            document_topics: DocumentTopics::Distributions(vec![
                vec![0.9, 0.1],
                vec![0.2, 0.8],
                vec![0.6, 0.4],
            ]),
        },
    };
    let ctx = RunContext::new(run_date(), 2, docs);
    let result = run(&backend, &ctx).unwrap();

    assert_eq!(result.document_count, 5);
    assert_eq!(result.assigned_count(), 3);
    let ids: Vec<Vec<&str>> = result
        .topics
        .iter()
        .map(|t| t.articles.iter().map(|a| a.article_id.as_str()).collect())
        .collect();
    // Topic 0 lists Alpha before Beta; d0 and d2 are both Alpha
    assert_eq!(ids, vec![vec!["d0", "d2"], vec!["d1"]]);
    assert_eq!(result.topics[0].source_stat("Alpha").count, 2);
    assert!((result.topics[0].source_stat("Alpha").proportion - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn rerun_with_same_input_serializes_identically() {
    let ctx = RunContext::new(run_date(), 2, alpha_beta_corpus());
    let first = create_backend(Algorithm::Nmf, &settings()).unwrap();
    let second = create_backend(Algorithm::Nmf, &settings()).unwrap();

    let a = run(first.as_ref(), &ctx).unwrap().to_json().unwrap();
    let b = run(second.as_ref(), &ctx).unwrap().to_json().unwrap();
    assert_eq!(a, b);
}

#[test]
fn outlier_cluster_never_becomes_a_topic() {
    let docs: Vec<Document> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| Document::new(*id, "Alpha", "testo"))
        .collect();
    let backend = Scripted {
        algorithm: Algorithm::Bertopic,
        outlier: Some(-1),
        discovery: Discovery {
            topics: vec![
                raw(-1, &[("rumore", 9.0)]),
                raw(3, &[("calcio", 1.0)]),
                raw(0, &[("governo", 1.0)]),
            ],
            document_topics: DocumentTopics::Labels(vec![3, -1, 0, 3]),
        },
    };
    let ctx = RunContext::new(run_date(), 10, docs);
    let result = run(&backend, &ctx).unwrap();

    assert_eq!(result.num_topics, 2);
    assert!(result.topics.iter().all(|t| !t.words.contains(&"rumore".to_string())));
    // Backend ids 0 and 3 become canonical 0 and 1
    assert_eq!(result.topics[0].label, "Governo");
    assert_eq!(result.topics[1].label, "Calcio");
    assert_eq!(result.topics[1].articles.len(), 2);
    assert_eq!(result.assigned_count(), 3);
}

#[test]
fn declared_source_without_articles_appears_with_zeros() {
    let ctx = RunContext::new(run_date(), 2, alpha_beta_corpus())
        .with_declared_sources(vec!["Gamma".to_string()]);
    let backend = create_backend(Algorithm::Lda, &settings()).unwrap();
    let result = run(backend.as_ref(), &ctx).unwrap();

    for topic in &result.topics {
        assert_eq!(topic.newspaper_counts.get("Gamma"), Some(&0));
        assert_eq!(topic.newspaper_weights.get("Gamma"), Some(&0.0));
    }
}

#[test]
fn fallback_chain_reports_the_backend_that_ran() {
    // Two documents are too few for the count vectorizer's min_df cutoff,
    // but fine for a label-based backend
    let docs = vec![Document::new("a", "Alpha", "uno"), Document::new("b", "Beta", "due")];
    let ctx = RunContext::new(run_date(), 2, docs);

    let outcome = run_with_fallback(
        Algorithm::Lda,
        &[Algorithm::Bertopic],
        |alg| -> anyhow::Result<Box<dyn TopicBackend>> {
            match alg {
                Algorithm::Bertopic => Ok(Box::new(Scripted {
                    algorithm: Algorithm::Bertopic,
                    outlier: Some(-1),
                    discovery: Discovery {
                        topics: vec![raw(0, &[("uno", 1.0)])],
                        document_topics: DocumentTopics::Labels(vec![0, -1]),
                    },
                })),
                other => create_backend(other, &settings()),
            }
        },
        &ctx,
    )
    .unwrap();

    assert_eq!(outcome.ran, Algorithm::Bertopic);
    assert_eq!(outcome.result.algorithm, Algorithm::Bertopic);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].kind(), "backend_failure");
}

#[tokio::test]
async fn persisted_result_loads_back_unchanged() {
    let ctx = RunContext::new(run_date(), 2, alpha_beta_corpus());
    let backend = create_backend(Algorithm::Lda, &settings()).unwrap();
    let result = run(backend.as_ref(), &ctx).unwrap();

    let store = SqliteStore::in_memory().unwrap();
    let stored = persist(&store, result.clone()).await.unwrap();
    assert_eq!(stored, result);
    assert_eq!(store.load_result(result.key()).await.unwrap(), Some(result));
}

#[test]
fn out_of_vocabulary_document_falls_to_the_first_topic() {
    let mut docs: Vec<Document> = [
        "governo legge riforma parlamento",
        "parlamento governo voto legge",
        "ministro governo riforma voto",
        "calcio squadra campionato partita",
        "squadra partita allenatore calcio",
        "campionato calcio squadra partita",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| Document::new(format!("n{i}"), "Corriere", *text))
    .collect();
    // Both words appear once, below min_df, so the TF-IDF row is empty
    docs.push(Document::new("oov", "Stampa", "zanzara ornitorinco"));

    let ctx = RunContext::new(run_date(), 2, docs);
    let backend = create_backend(Algorithm::Nmf, &settings()).unwrap();
    let result = run(backend.as_ref(), &ctx).unwrap();

    assert_eq!(result.assigned_count(), 7);
    let first = &result.topics[0];
    assert!(
        first.articles.iter().any(|a| a.article_id == "oov"),
        "topic 0 articles: {:?}",
        first.articles.iter().map(|a| &a.article_id).collect::<Vec<_>>()
    );
    assert_eq!(first.source_stat("Stampa").count, 1);
    assert_eq!(first.source_stat("Stampa").proportion, 1.0);
}
