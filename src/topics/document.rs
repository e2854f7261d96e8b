// Document: one preprocessed article handed to the pipeline.
//
// Documents are owned by the caller and only borrowed by a run. Anything
// the pipeline derives (dominant topic, distribution) lives in side tables
// keyed by the document's ingestion index, never on the document itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A preprocessed news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable article identifier from the ingestion layer
    pub id: String,
    /// The newspaper or feed the article came from
    pub source_id: String,
    /// Preprocessed (normalized, lemmatized) text; may be empty
    pub text: String,
    /// Optional precomputed embedding, used by the embedding backend
    pub features: Option<Vec<f64>>,
    /// Display metadata carried through to the serialized result
    pub meta: ArticleMeta,
}

/// Display metadata for an article. None of it affects topic modeling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub date: Option<NaiveDate>,
}

impl Document {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            text: text.into(),
            features: None,
            meta: ArticleMeta::default(),
        }
    }

    pub fn with_features(mut self, features: Vec<f64>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_meta(mut self, meta: ArticleMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Whether this document has any text worth modeling.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Ingestion indices of the documents that survive empty-text filtering,
/// in input order.
pub fn usable_indices(documents: &[Document]) -> Vec<usize> {
    documents
        .iter()
        .enumerate()
        .filter(|(_, d)| d.has_text())
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_only_text_is_not_usable() {
        let docs = vec![
            Document::new("a", "Alpha", "governo legge"),
            Document::new("b", "Alpha", "   \n\t"),
            Document::new("c", "Beta", ""),
            Document::new("d", "Beta", "calcio"),
        ];
        assert_eq!(usable_indices(&docs), vec![0, 3]);
    }
}
