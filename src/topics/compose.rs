// Result composer: one immutable TopicModelResult per (date, algorithm).
//
// The serialized field names (date, num_articles, newspaper_counts, ...)
// are read by the dashboard and must not change. Maps are BTreeMaps and
// articles are sorted, so identical input serializes to identical bytes.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::aggregate::{SourceMatrix, SourceTopicStat};
use super::assign::Assignment;
use super::document::Document;
use super::error::PipelineError;
use super::normalize::Topic;
use super::traits::Algorithm;

/// Persistence key: one result per run date and algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub date: NaiveDate,
    pub algorithm: Algorithm,
}

impl ResultKey {
    pub fn new(date: NaiveDate, algorithm: Algorithm) -> Self {
        Self { date, algorithm }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date.format("%Y-%m-%d"), self.algorithm)
    }
}

/// An article as listed under its topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub article_id: String,
    #[serde(default)]
    pub title: String,
    pub newspaper: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub summary: String,
}

impl ArticleRef {
    fn from_document(doc: &Document) -> Self {
        Self {
            article_id: doc.id.clone(),
            title: doc.meta.title.clone(),
            newspaper: doc.source_id.clone(),
            url: doc.meta.url.clone(),
            summary: doc.meta.summary.clone(),
        }
    }
}

/// A topic with everything the dashboard needs about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub topic_id: usize,
    pub words: Vec<String>,
    pub weights: Vec<f64>,
    pub label: String,
    /// Assigned articles, ordered by newspaper then ingestion order
    pub articles: Vec<ArticleRef>,
    pub newspaper_counts: BTreeMap<String, u32>,
    pub newspaper_weights: BTreeMap<String, f64>,
}

impl TopicEntry {
    /// The (topic, source) cell for this topic. Unknown sources read as zero.
    pub fn source_stat(&self, source_id: &str) -> SourceTopicStat {
        SourceTopicStat {
            count: self.newspaper_counts.get(source_id).copied().unwrap_or(0),
            proportion: self.newspaper_weights.get(source_id).copied().unwrap_or(0.0),
        }
    }
}

/// The composed output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModelResult {
    #[serde(rename = "date")]
    pub run_date: NaiveDate,
    pub algorithm: Algorithm,
    /// Input documents before empty-text filtering
    #[serde(rename = "num_articles")]
    pub document_count: usize,
    pub num_topics: usize,
    pub topics: Vec<TopicEntry>,
}

impl TopicModelResult {
    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.run_date, self.algorithm)
    }

    /// Articles placed under some topic.
    pub fn assigned_count(&self) -> usize {
        self.topics.iter().map(|t| t.articles.len()).sum()
    }

    /// Share of input documents that ended up under a topic.
    pub fn coverage(&self) -> f64 {
        if self.document_count == 0 {
            0.0
        } else {
            self.assigned_count() as f64 / self.document_count as f64
        }
    }

    /// Pretty JSON, the on-disk and in-database form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Run metadata stamped onto the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMeta {
    pub run_date: NaiveDate,
    pub algorithm: Algorithm,
}

/// Merge topics, assignments and the source matrix into a result.
///
/// `documents` is the full input corpus. Fails with `CompositionError` on
/// any dangling reference or count mismatch.
pub fn compose(
    meta: RunMeta,
    documents: &[Document],
    topics: Vec<Topic>,
    assignments: &[Assignment],
    matrix: &SourceMatrix,
) -> Result<TopicModelResult, PipelineError> {
    let invariant = |msg: String| PipelineError::CompositionError(msg);

    if matrix.topic_count() != topics.len() {
        return Err(invariant(format!(
            "source matrix has {} topic rows but {} topics were normalized",
            matrix.topic_count(),
            topics.len()
        )));
    }
    if let Some((pos, t)) = topics.iter().enumerate().find(|(i, t)| t.topic_id != *i) {
        return Err(invariant(format!(
            "topic at position {pos} carries id {}; ids must be dense",
            t.topic_id
        )));
    }
    if let Some(t) = topics.iter().find(|t| t.words.len() != t.weights.len()) {
        return Err(invariant(format!(
            "topic {} has {} words but {} weights",
            t.topic_id,
            t.words.len(),
            t.weights.len()
        )));
    }

    let mut seen = HashSet::with_capacity(assignments.len());
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); topics.len()];

    for a in assignments {
        if a.document >= documents.len() {
            return Err(invariant(format!(
                "assignment references document {} of {}",
                a.document,
                documents.len()
            )));
        }
        if !seen.insert(a.document) {
            return Err(invariant(format!("document {} assigned twice", a.document)));
        }
        if let Some(topic) = a.topic {
            match members.get_mut(topic) {
                Some(list) => list.push(a.document),
                None => {
                    return Err(invariant(format!(
                        "document '{}' assigned to topic {topic}, which does not exist",
                        documents[a.document].id
                    )))
                }
            }
        }
    }

    let mut entries = Vec::with_capacity(topics.len());
    for (topic, mut docs) in topics.into_iter().zip(members) {
        docs.sort_by(|&a, &b| {
            documents[a]
                .source_id
                .cmp(&documents[b].source_id)
                .then(a.cmp(&b))
        });

        let row = matrix.row(topic.topic_id).cloned().unwrap_or_default();
        let counted: u64 = row.values().map(|s| s.count as u64).sum();
        if counted != docs.len() as u64 {
            return Err(invariant(format!(
                "topic {} lists {} articles but its source counts sum to {counted}",
                topic.topic_id,
                docs.len()
            )));
        }

        let newspaper_counts = row.iter().map(|(s, stat)| (s.clone(), stat.count)).collect();
        let newspaper_weights = row.into_iter().map(|(s, stat)| (s, stat.proportion)).collect();

        entries.push(TopicEntry {
            topic_id: topic.topic_id,
            words: topic.words,
            weights: topic.weights,
            label: topic.label,
            articles: docs.iter().map(|&i| ArticleRef::from_document(&documents[i])).collect(),
            newspaper_counts,
            newspaper_weights,
        });
    }

    Ok(TopicModelResult {
        run_date: meta.run_date,
        algorithm: meta.algorithm,
        document_count: documents.len(),
        num_topics: entries.len(),
        topics: entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::aggregate::aggregate;

    fn meta() -> RunMeta {
        RunMeta {
            run_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            algorithm: Algorithm::Nmf,
        }
    }

    fn topic(id: usize, word: &str) -> Topic {
        Topic {
            topic_id: id,
            words: vec![word.to_string()],
            weights: vec![1.0],
            label: word.to_string(),
        }
    }

    fn assigned(document: usize, topic: Option<usize>) -> Assignment {
        Assignment {
            document,
            topic,
            distribution: None,
        }
    }

    #[test]
    fn test_articles_sorted_by_source_then_ingestion() {
        let docs = vec![
            Document::new("z1", "Stampa", "a"),
            Document::new("c1", "Corriere", "b"),
            Document::new("z2", "Stampa", "c"),
            Document::new("c2", "Corriere", "d"),
        ];
        let assignments: Vec<_> = (0..4).map(|i| assigned(i, Some(0))).collect();
        let matrix = aggregate(&docs, &assignments, 1, &[]);
        let result = compose(meta(), &docs, vec![topic(0, "x")], &assignments, &matrix).unwrap();
        let ids: Vec<_> = result.topics[0].articles.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "z1", "z2"]);
    }

    #[test]
    fn test_document_count_includes_filtered_documents() {
        let docs = vec![Document::new("1", "Stampa", "testo"), Document::new("2", "Stampa", "")];
        let assignments = vec![assigned(0, Some(0))];
        let matrix = aggregate(&docs, &assignments, 1, &[]);
        let result = compose(meta(), &docs, vec![topic(0, "x")], &assignments, &matrix).unwrap();
        assert_eq!(result.document_count, 2);
        assert_eq!(result.num_topics, 1);
        assert!((result.coverage() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dangling_topic_reference_is_rejected() {
        let docs = vec![Document::new("1", "Stampa", "testo")];
        let assignments = vec![assigned(0, Some(3))];
        let matrix = aggregate(&docs, &assignments, 1, &[]);
        let err = compose(meta(), &docs, vec![topic(0, "x")], &assignments, &matrix).unwrap_err();
        assert!(matches!(err, PipelineError::CompositionError(_)), "got {err}");
    }

    #[test]
    fn test_duplicate_assignment_is_rejected() {
        let docs = vec![Document::new("1", "Stampa", "testo")];
        let assignments = vec![assigned(0, Some(0)), assigned(0, None)];
        let matrix = aggregate(&docs, &assignments, 1, &[]);
        let err = compose(meta(), &docs, vec![topic(0, "x")], &assignments, &matrix).unwrap_err();
        assert_eq!(err.kind(), "composition_error");
    }

    #[test]
    fn test_matrix_row_mismatch_is_rejected() {
        let docs = vec![Document::new("1", "Stampa", "testo")];
        let matrix = aggregate(&docs, &[], 2, &[]);
        let err = compose(meta(), &docs, vec![topic(0, "x")], &[], &matrix).unwrap_err();
        assert_eq!(err.kind(), "composition_error");
    }

    #[test]
    fn test_serialized_field_names() {
        let docs = vec![Document::new("1", "Stampa", "testo")];
        let assignments = vec![assigned(0, Some(0))];
        let matrix = aggregate(&docs, &assignments, 1, &[]);
        let result = compose(meta(), &docs, vec![topic(0, "x")], &assignments, &matrix).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(value["date"], "2024-03-05");
        assert_eq!(value["algorithm"], "nmf");
        assert_eq!(value["num_articles"], 1);
        assert_eq!(value["num_topics"], 1);
        let t = &value["topics"][0];
        assert_eq!(t["newspaper_counts"]["Stampa"], 1);
        assert_eq!(t["newspaper_weights"]["Stampa"], 1.0);
        assert_eq!(t["articles"][0]["newspaper"], "Stampa");
        assert_eq!(t["articles"][0]["article_id"], "1");
    }
}
