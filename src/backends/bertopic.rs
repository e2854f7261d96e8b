// Embedding-clustering backend ("bertopic").
//
// Documents are embedded, then grouped with density-based clustering on
// cosine similarity: a document with at least `min_topic_size` neighbours
// (itself included) above `similarity_threshold` is a core point, clusters
// grow outward from core points in document order, and whatever no
// cluster reaches is noise (label -1). The topic count falls out of the
// data; the requested `k` is ignored.
//
// Topic words come from class-based TF-IDF: each cluster is treated as one
// big document, and a word scores high when it is frequent in that
// cluster and rare across clusters.

use std::collections::{BTreeMap, HashSet, VecDeque};

use anyhow::Result;
use tracing::{info, warn};

use super::embeddings::{cosine_similarity, l2_normalize, SentenceEmbedder};
use super::vocabulary::tokenize;
use crate::topics::document::Document;
use crate::topics::traits::{Algorithm, Discovery, DocumentTopics, RawTopic, TopicBackend};

/// Cluster label for documents that belong to no topic.
pub const OUTLIER_LABEL: i64 = -1;

const TERMS_PER_TOPIC: usize = 10;

pub struct BertopicBackend {
    embedder: Option<SentenceEmbedder>,
    stop_words: HashSet<String>,
    pub similarity_threshold: f64,
    pub min_topic_size: usize,
}

impl BertopicBackend {
    /// `embedder` may be `None` when every document ships its own vector.
    pub fn new(embedder: Option<SentenceEmbedder>, stop_words: HashSet<String>) -> Self {
        Self {
            embedder,
            stop_words,
            similarity_threshold: 0.6,
            min_topic_size: 2,
        }
    }

    /// One vector per document: precomputed where present, embedded otherwise.
    fn vectors(&self, documents: &[&Document]) -> Result<Vec<Vec<f64>>> {
        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.features.is_none())
            .map(|(i, _)| i)
            .collect();

        let mut embedded = Vec::new();
        if !missing.is_empty() {
            let Some(embedder) = &self.embedder else {
                anyhow::bail!(
                    "{} of {} documents have no precomputed embedding and no sentence model is loaded",
                    missing.len(),
                    documents.len()
                );
            };
            let texts: Vec<&str> = missing.iter().map(|&i| documents[i].text.as_str()).collect();
            embedded = embedder.embed(&texts)?;
        }

        let mut embedded = embedded.into_iter();
        let mut vectors = Vec::with_capacity(documents.len());
        for doc in documents {
            let mut v = match &doc.features {
                Some(f) => f.clone(),
                None => embedded
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("sentence model returned too few vectors"))?,
            };
            if v.iter().any(|x| !x.is_finite()) {
                anyhow::bail!("document '{}' has a non-finite embedding value", doc.id);
            }
            l2_normalize(&mut v);
            vectors.push(v);
        }

        if let Some(first) = vectors.first() {
            let dim = first.len();
            if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
                anyhow::bail!(
                    "embedding dimensions disagree: document '{}' has {} values, expected {dim}",
                    documents[bad].id,
                    vectors[bad].len()
                );
            }
        }

        Ok(vectors)
    }
}

impl TopicBackend for BertopicBackend {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bertopic
    }

    fn outlier_label(&self) -> Option<i64> {
        Some(OUTLIER_LABEL)
    }

    fn discover(&self, documents: &[&Document], _k: usize) -> Result<Discovery> {
        let vectors = self.vectors(documents)?;
        let labels = density_clusters(&vectors, self.similarity_threshold, self.min_topic_size);

        let clusters = labels.iter().filter(|&&l| l != OUTLIER_LABEL).collect::<HashSet<_>>().len();
        let noise = labels.iter().filter(|&&l| l == OUTLIER_LABEL).count();
        info!(documents = documents.len(), clusters, noise, "Clustered document embeddings");
        if clusters == 0 {
            warn!("Every document was classified as noise");
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let topics = class_tfidf(&texts, &labels, &self.stop_words, TERMS_PER_TOPIC);

        Ok(Discovery {
            topics,
            document_topics: DocumentTopics::Labels(labels),
        })
    }
}

/// Density clustering over unit vectors. Returns one label per vector;
/// clusters are numbered 0.. in order of their first core point.
pub fn density_clusters(vectors: &[Vec<f64>], threshold: f64, min_size: usize) -> Vec<i64> {
    let n = vectors.len();
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_similarity(&vectors[i], &vectors[j]) >= threshold)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_size.max(1)).collect();

    let mut labels = vec![OUTLIER_LABEL; n];
    let mut next_label = 0i64;

    for seed in 0..n {
        if !is_core[seed] || labels[seed] != OUTLIER_LABEL {
            continue;
        }
        labels[seed] = next_label;
        let mut queue = VecDeque::from([seed]);
        while let Some(point) = queue.pop_front() {
            if !is_core[point] {
                continue;
            }
            for &nb in &neighbours[point] {
                if labels[nb] == OUTLIER_LABEL {
                    labels[nb] = next_label;
                    queue.push_back(nb);
                }
            }
        }
        next_label += 1;
    }

    labels
}

/// Class-based TF-IDF: score(w, c) = tf(w, c) / |c| · ln(1 + A / f(w)),
/// with |c| the word count of class c, A the mean word count per class,
/// and f(w) the frequency of w over all classes. The noise class is
/// scored too, so the normalizer sees it and drops it.
pub fn class_tfidf(
    texts: &[&str],
    labels: &[i64],
    stop_words: &HashSet<String>,
    top_n: usize,
) -> Vec<RawTopic> {
    let mut class_counts: BTreeMap<i64, BTreeMap<String, f64>> = BTreeMap::new();
    for (text, &label) in texts.iter().zip(labels) {
        let counts = class_counts.entry(label).or_default();
        for token in tokenize(text).filter(|t| !stop_words.contains(t)) {
            *counts.entry(token).or_insert(0.0) += 1.0;
        }
    }

    let mut overall: BTreeMap<&str, f64> = BTreeMap::new();
    for counts in class_counts.values() {
        for (word, c) in counts {
            *overall.entry(word.as_str()).or_insert(0.0) += c;
        }
    }

    let class_sizes: BTreeMap<i64, f64> = class_counts
        .iter()
        .map(|(&label, counts)| (label, counts.values().sum()))
        .collect();
    let mean_size = if class_sizes.is_empty() {
        0.0
    } else {
        class_sizes.values().sum::<f64>() / class_sizes.len() as f64
    };

    class_counts
        .iter()
        .map(|(&label, counts)| {
            let size = class_sizes[&label];
            let mut terms: Vec<(String, f64)> = counts
                .iter()
                .map(|(word, &tf)| {
                    let f = overall[word.as_str()];
                    let score = if size > 0.0 { tf / size * (1.0 + mean_size / f).ln() } else { 0.0 };
                    (word.clone(), score)
                })
                .collect();
            // BTreeMap iteration already ordered words alphabetically
            terms.sort_by(|a, b| b.1.total_cmp(&a.1));
            terms.truncate(top_n);
            RawTopic {
                topic_id: label,
                terms,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f64, y: f64) -> Vec<f64> {
        vec![x, y]
    }

    #[test]
    fn test_density_clusters_with_noise() {
        let vectors = vec![
            unit(1.0, 0.0),
            unit(0.99, 0.1),
            unit(0.0, 1.0),
            unit(0.1, 0.99),
            unit(-1.0, 0.0),
        ];
        let labels = density_clusters(&vectors, 0.9, 2);
        assert_eq!(labels, vec![0, 0, 1, 1, OUTLIER_LABEL]);
    }

    #[test]
    fn test_density_clusters_min_size_one_has_no_noise() {
        let vectors = vec![unit(1.0, 0.0), unit(-1.0, 0.0)];
        assert_eq!(density_clusters(&vectors, 0.9, 1), vec![0, 1]);
    }

    #[test]
    fn test_class_tfidf_prefers_distinctive_words() {
        let texts = ["calcio squadra notizia", "calcio gol notizia", "governo legge notizia"];
        let topics = class_tfidf(&texts, &[0, 0, 1], &HashSet::new(), 10);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].topic_id, 0);
        assert_eq!(topics[0].terms[0].0, "calcio");
        let notizia = topics[0].terms.iter().find(|(w, _)| w == "notizia").unwrap().1;
        assert!(topics[0].terms[0].1 > notizia);
    }

    #[test]
    fn test_discover_uses_precomputed_features() {
        let docs: Vec<Document> = vec![
            Document::new("a", "Stampa", "calcio squadra").with_features(unit(1.0, 0.0)),
            Document::new("b", "Stampa", "calcio gol").with_features(unit(0.98, 0.05)),
            Document::new("c", "Corriere", "governo legge").with_features(unit(0.0, 1.0)),
        ];
        let refs: Vec<&Document> = docs.iter().collect();
        let backend = BertopicBackend::new(None, HashSet::new());
        let out = backend.discover(&refs, 10).unwrap();

        assert_eq!(out.document_topics, DocumentTopics::Labels(vec![0, 0, OUTLIER_LABEL]));
        assert!(out.topics.iter().any(|t| t.topic_id == OUTLIER_LABEL));
    }

    #[test]
    fn test_discover_without_model_or_features_fails() {
        let docs = vec![Document::new("a", "Stampa", "calcio")];
        let refs: Vec<&Document> = docs.iter().collect();
        let backend = BertopicBackend::new(None, HashSet::new());
        assert!(backend.discover(&refs, 5).is_err());
    }
}
