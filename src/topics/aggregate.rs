// Cross-source aggregation: how much of each newspaper landed in each topic.
//
// The matrix is complete: every topic has a cell for every source seen
// anywhere in the corpus (plus any declared sources), whether or not that
// source contributed to the topic. Cells are kept in BTreeMaps so output
// order is topic id then source id, independent of hashing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::assign::Assignment;
use super::document::Document;

/// One (topic, source) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTopicStat {
    /// Documents from this source assigned to this topic
    pub count: u32,
    /// `count` over all documents from this source; 0 when the source
    /// contributed nothing
    pub proportion: f64,
}

/// Complete topic × source matrix for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMatrix {
    rows: Vec<BTreeMap<String, SourceTopicStat>>,
    totals: BTreeMap<String, u32>,
}

impl SourceMatrix {
    pub fn topic_count(&self) -> usize {
        self.rows.len()
    }

    /// All sources in the matrix, lexically ordered.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.totals.keys().map(String::as_str)
    }

    /// Documents contributed by a source to the whole corpus.
    pub fn source_total(&self, source_id: &str) -> u32 {
        self.totals.get(source_id).copied().unwrap_or(0)
    }

    pub fn get(&self, topic_id: usize, source_id: &str) -> Option<&SourceTopicStat> {
        self.rows.get(topic_id).and_then(|row| row.get(source_id))
    }

    pub fn row(&self, topic_id: usize) -> Option<&BTreeMap<String, SourceTopicStat>> {
        self.rows.get(topic_id)
    }

    /// Every cell as (topic_id, source_id, stat), topic then source order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &str, &SourceTopicStat)> {
        self.rows.iter().enumerate().flat_map(|(topic_id, row)| {
            row.iter()
                .map(move |(source, stat)| (topic_id, source.as_str(), stat))
        })
    }
}

/// Build the matrix.
///
/// `documents` is the full input corpus, including empty-text documents,
/// so per-source totals match what was ingested. Assignments pointing at
/// topics `>= topic_count` or documents out of range are ignored here;
/// the composer rejects them.
pub fn aggregate(
    documents: &[Document],
    assignments: &[Assignment],
    topic_count: usize,
    declared_sources: &[String],
) -> SourceMatrix {
    let mut totals: BTreeMap<String, u32> = declared_sources
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| (s.clone(), 0))
        .collect();
    for doc in documents {
        *totals.entry(doc.source_id.clone()).or_insert(0) += 1;
    }

    let mut counts: Vec<BTreeMap<&str, u32>> = vec![BTreeMap::new(); topic_count];
    for assignment in assignments {
        let (Some(topic), Some(doc)) = (assignment.topic, documents.get(assignment.document))
        else {
            continue;
        };
        if let Some(row) = counts.get_mut(topic) {
            *row.entry(doc.source_id.as_str()).or_insert(0) += 1;
        }
    }

    let rows: Vec<BTreeMap<String, SourceTopicStat>> = counts
        .iter()
        .map(|row| {
            totals
                .iter()
                .map(|(source, &total)| {
                    let count = row.get(source.as_str()).copied().unwrap_or(0);
                    (source.clone(), SourceTopicStat {
                        count,
                        proportion: proportion(count, total),
                    })
                })
                .collect()
        })
        .collect();

    SourceMatrix { rows, totals }
}

fn proportion(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
