// Document-to-topic assignment.
//
// Each usable document gets exactly one dominant topic or none. "None"
// covers the outlier cluster, labels the normalizer never saw, rows with
// nothing finite in them, and documents past the end of a truncated
// backend output. An all-zero row is a tie like any other.

use super::normalize::NormalizedTopics;
use super::traits::DocumentTopics;

/// The dominant-topic decision for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Ingestion index of the document in the caller's corpus
    pub document: usize,
    /// Canonical topic id, or `None` for unassigned
    pub topic: Option<usize>,
    /// The backend's weight vector for this document, when it has one
    pub distribution: Option<Vec<f64>>,
}

impl Assignment {
    pub fn is_assigned(&self) -> bool {
        self.topic.is_some()
    }
}

/// Assign every usable document.
///
/// `usable[i]` is the ingestion index of the i-th document passed to the
/// backend, so backend row `i` belongs to document `usable[i]`.
pub fn assign(
    usable: &[usize],
    document_topics: &DocumentTopics,
    topics: &NormalizedTopics,
) -> Vec<Assignment> {
    usable
        .iter()
        .enumerate()
        .map(|(row, &document)| match document_topics {
            DocumentTopics::Distributions(rows) => match rows.get(row) {
                Some(weights) => Assignment {
                    document,
                    topic: dominant_column(weights)
                        .and_then(|col| topics.canonical_id(col as i64)),
                    distribution: Some(weights.clone()),
                },
                None => unassigned(document),
            },
            DocumentTopics::Labels(labels) => Assignment {
                document,
                topic: labels.get(row).and_then(|&label| topics.canonical_id(label)),
                distribution: None,
            },
        })
        .collect()
}

fn unassigned(document: usize) -> Assignment {
    Assignment {
        document,
        topic: None,
        distribution: None,
    }
}

/// Index of the largest finite weight; ties go to the lowest index, so
/// an all-zero row lands on column 0.
///
/// Returns `None` only when the row is empty or nothing in it is finite.
pub fn dominant_column(weights: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &w) in weights.iter().enumerate() {
        if !w.is_finite() {
            continue;
        }
        match best {
            Some((_, top)) if w <= top => {}
            _ => best = Some((i, w)),
        }
    }
    best.map(|(i, _)| i)
}
