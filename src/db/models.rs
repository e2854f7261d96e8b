// Data models for stored results.
//
// The full result is stored as JSON; these are the lightweight listing
// types so `status` doesn't have to deserialize every topic.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::topics::compose::TopicModelResult;
use crate::topics::traits::Algorithm;
use crate::topics::ResultKey;

/// One stored result, without its topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResultSummary {
    pub date: NaiveDate,
    pub algorithm: Algorithm,
    pub num_articles: usize,
    pub num_topics: usize,
    /// Articles that landed under some topic
    pub assigned_articles: usize,
    /// When the result was last written, if the store tracks it
    pub stored_at: Option<String>,
}

impl StoredResultSummary {
    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.date, self.algorithm)
    }
}

impl From<&TopicModelResult> for StoredResultSummary {
    fn from(result: &TopicModelResult) -> Self {
        Self {
            date: result.run_date,
            algorithm: result.algorithm,
            num_articles: result.document_count,
            num_topics: result.num_topics,
            assigned_articles: result.assigned_count(),
            stored_at: None,
        }
    }
}

/// An entry of the per-date summary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSummary {
    pub num_topics: usize,
    pub num_articles: usize,
}

/// Build the `{date: {num_topics, num_articles}}` summary. When a date has
/// several algorithms, the last one listed wins.
pub fn date_summary<'a>(
    results: impl IntoIterator<Item = &'a TopicModelResult>,
) -> BTreeMap<String, DateSummary> {
    results
        .into_iter()
        .map(|r| {
            (
                r.run_date.format("%Y-%m-%d").to_string(),
                DateSummary {
                    num_topics: r.num_topics,
                    num_articles: r.document_count,
                },
            )
        })
        .collect()
}
