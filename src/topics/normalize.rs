// Topic normalizer: backend-specific topics to canonical `Topic` records.
//
// Backends disagree on almost everything: word list length, ordering,
// whether ids are dense, whether a noise cluster exists. After this step
// every topic has at most TOP_N_WORDS words ranked by weight, a label,
// and a dense id in 0..T-1.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::traits::RawTopic;

/// How many words each canonical topic keeps.
pub const TOP_N_WORDS: usize = 10;

/// Label for a topic that has no words at all.
pub const FALLBACK_LABEL: &str = "Miscellaneous";

/// A canonical topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Dense id, unique within a run
    pub topic_id: usize,
    /// Top words, highest weight first
    pub words: Vec<String>,
    /// Weights matching `words` one-to-one, non-negative
    pub weights: Vec<f64>,
    pub label: String,
}

/// Canonical topics plus the mapping from backend ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTopics {
    pub topics: Vec<Topic>,
    ids: HashMap<i64, usize>,
}

impl NormalizedTopics {
    /// Canonical id for a backend topic id. `None` for the outlier topic
    /// and for ids the backend never declared.
    pub fn canonical_id(&self, backend_id: i64) -> Option<usize> {
        self.ids.get(&backend_id).copied()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Normalize a backend's raw topics.
///
/// Fails on non-finite weights. Negative weights are clamped to zero and
/// empty words are dropped.
pub fn normalize(raw: &[RawTopic], outlier_label: Option<i64>) -> Result<NormalizedTopics> {
    struct Survivor {
        backend_id: i64,
        mass: f64,
        words: Vec<String>,
        weights: Vec<f64>,
    }

    let mut survivors = Vec::with_capacity(raw.len());

    for topic in raw {
        if Some(topic.topic_id) == outlier_label {
            continue;
        }

        let mut terms = Vec::with_capacity(topic.terms.len());
        for (word, weight) in &topic.terms {
            if !weight.is_finite() {
                anyhow::bail!(
                    "topic {} has a non-finite weight ({weight}) for '{word}'",
                    topic.topic_id
                );
            }
            if word.is_empty() {
                continue;
            }
            let weight = if *weight > 0.0 { *weight } else { 0.0 };
            terms.push((word.clone(), weight));
        }

        let mass: f64 = terms.iter().map(|(_, w)| w).sum();

        // sort_by is stable, so equal weights keep the backend's order
        terms.sort_by(|a, b| b.1.total_cmp(&a.1));
        terms.truncate(TOP_N_WORDS);

        let (words, weights) = terms.into_iter().unzip();
        survivors.push(Survivor {
            backend_id: topic.topic_id,
            mass,
            words,
            weights,
        });
    }

    survivors.sort_by(|a, b| match a.backend_id.cmp(&b.backend_id) {
        Ordering::Equal => b.mass.total_cmp(&a.mass),
        other => other,
    });

    let mut ids = HashMap::with_capacity(survivors.len());
    let mut topics = Vec::with_capacity(survivors.len());

    for (topic_id, survivor) in survivors.into_iter().enumerate() {
        if ids.contains_key(&survivor.backend_id) {
            warn!(
                backend_id = survivor.backend_id,
                topic_id, "Backend reported a duplicate topic id; documents map to the heavier one"
            );
        } else {
            ids.insert(survivor.backend_id, topic_id);
        }

        topics.push(Topic {
            topic_id,
            label: topic_label(&survivor.words),
            words: survivor.words,
            weights: survivor.weights,
        });
    }

    Ok(NormalizedTopics { topics, ids })
}

/// Label a topic by its highest-weight word, capitalized.
pub fn topic_label(words: &[String]) -> String {
    let Some(first) = words.first() else {
        return FALLBACK_LABEL.to_string();
    };

    let mut chars = first.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => FALLBACK_LABEL.to_string(),
    }
}
