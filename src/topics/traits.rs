// Topic backend trait: the swap-ready abstraction over discovery algorithms.
//
// Three very different algorithms sit behind this trait: a probabilistic
// topic model, a matrix factorization, and embedding clustering. They all
// return the same loose shape (`Discovery`); the normalizer and assigner
// turn that into canonical topics.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::document::Document;

/// Which topic-discovery algorithm produced (or should produce) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Latent Dirichlet Allocation over term counts
    Lda,
    /// Non-negative matrix factorization over TF-IDF
    Nmf,
    /// Sentence embeddings + density clustering
    Bertopic,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Lda, Algorithm::Nmf, Algorithm::Bertopic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Lda => "lda",
            Algorithm::Nmf => "nmf",
            Algorithm::Bertopic => "bertopic",
        }
    }

    /// Whether the backend honors the requested topic count.
    /// Embedding clustering decides the count itself.
    pub fn honors_topic_count(&self) -> bool {
        !matches!(self, Algorithm::Bertopic)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lda" => Ok(Algorithm::Lda),
            "nmf" => Ok(Algorithm::Nmf),
            "bertopic" => Ok(Algorithm::Bertopic),
            other => anyhow::bail!("Unknown topic algorithm '{other}' (expected lda, nmf or bertopic)"),
        }
    }
}

/// One topic as the backend reports it: an id in the backend's own
/// numbering and a bag of (word, weight) pairs in no guaranteed order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTopic {
    pub topic_id: i64,
    pub terms: Vec<(String, f64)>,
}

/// Per-document output of a backend, indexed like the documents passed
/// to `discover`. May be shorter than the input if the backend truncated.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentTopics {
    /// Row `i` is document `i`'s weight over topics; column `j` is the
    /// backend topic with id `j`.
    Distributions(Vec<Vec<f64>>),
    /// Entry `i` is document `i`'s cluster label in backend numbering.
    Labels(Vec<i64>),
}

impl DocumentTopics {
    pub fn len(&self) -> usize {
        match self {
            DocumentTopics::Distributions(rows) => rows.len(),
            DocumentTopics::Labels(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a backend produced for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub topics: Vec<RawTopic>,
    pub document_topics: DocumentTopics,
}

/// Trait for discovering topics in a set of documents.
///
/// `discover` is synchronous and may run for minutes. Implementations
/// report every failure as an `Err`; the pipeline converts those (and
/// panics) into a typed `BackendFailure`.
pub trait TopicBackend: Send + Sync {
    /// The algorithm this backend implements.
    fn algorithm(&self) -> Algorithm;

    /// The backend's reserved "no topic" label, if it has one.
    fn outlier_label(&self) -> Option<i64> {
        None
    }

    /// Discover topics. Every document passed in has non-empty text.
    /// `k` is advisory; see `Algorithm::honors_topic_count`.
    fn discover(&self, documents: &[&Document], k: usize) -> Result<Discovery>;
}
