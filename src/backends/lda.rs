// LDA backend: Dirichlet-smoothed EM over a term-count matrix.
//
// Each iteration computes the expected topic responsibilities for every
// (document, term) count, then re-estimates document-topic and topic-term
// distributions with symmetric priors. Initialization comes from a seeded
// RNG, so a fixed seed gives identical topics across runs.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::vocabulary::{count_matrix, VocabularyOptions};
use crate::topics::document::Document;
use crate::topics::traits::{Algorithm, Discovery, DocumentTopics, RawTopic, TopicBackend};

/// Terms reported per topic; the normalizer keeps the top ten.
const TERMS_PER_TOPIC: usize = 20;

pub struct LdaBackend {
    pub vocabulary: VocabularyOptions,
    pub max_iter: usize,
    /// Stop when no document-topic probability moves more than this
    pub tolerance: f64,
    pub seed: u64,
}

impl LdaBackend {
    pub fn new(vocabulary: VocabularyOptions, seed: u64) -> Self {
        Self {
            vocabulary,
            max_iter: 100,
            tolerance: 1e-4,
            seed,
        }
    }
}

impl TopicBackend for LdaBackend {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lda
    }

    fn discover(&self, documents: &[&Document], k: usize) -> Result<Discovery> {
        if k == 0 {
            anyhow::bail!("LDA needs at least one topic");
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let dtm = count_matrix(&texts, &self.vocabulary)?;
        let n_docs = dtm.rows.len();
        let n_terms = dtm.n_terms();

        info!(documents = n_docs, terms = n_terms, topics = k, "Fitting LDA");

        let alpha = 1.0 / k as f64;
        let eta = 1.0 / k as f64;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut theta: Vec<Vec<f64>> = (0..n_docs).map(|_| random_simplex(&mut rng, k)).collect();
        let mut phi: Vec<Vec<f64>> = (0..k).map(|_| random_simplex(&mut rng, n_terms)).collect();
        let mut topic_term = vec![vec![0.0; n_terms]; k];

        for iteration in 0..self.max_iter {
            let mut doc_topic = vec![vec![0.0; k]; n_docs];
            for row in topic_term.iter_mut() {
                row.iter_mut().for_each(|v| *v = 0.0);
            }

            let mut resp = vec![0.0; k];
            for (d, row) in dtm.rows.iter().enumerate() {
                for &(v, count) in row {
                    let mut total = 0.0;
                    for t in 0..k {
                        resp[t] = theta[d][t] * phi[t][v];
                        total += resp[t];
                    }
                    if total <= f64::MIN_POSITIVE {
                        continue;
                    }
                    for t in 0..k {
                        let r = count * resp[t] / total;
                        doc_topic[d][t] += r;
                        topic_term[t][v] += r;
                    }
                }
            }

            let mut max_change: f64 = 0.0;
            for (d, counts) in doc_topic.iter().enumerate() {
                let denom: f64 = counts.iter().sum::<f64>() + k as f64 * alpha;
                for t in 0..k {
                    let updated = (counts[t] + alpha) / denom;
                    max_change = max_change.max((updated - theta[d][t]).abs());
                    theta[d][t] = updated;
                }
            }
            for t in 0..k {
                let denom: f64 = topic_term[t].iter().sum::<f64>() + n_terms as f64 * eta;
                for v in 0..n_terms {
                    phi[t][v] = (topic_term[t][v] + eta) / denom;
                }
            }

            if max_change < self.tolerance {
                debug!(iteration, max_change, "LDA converged");
                break;
            }
        }

        // Topic weights are pseudo-counts (expected counts plus prior)
        let topics = topic_term
            .iter()
            .enumerate()
            .map(|(t, row)| {
                let weights: Vec<f64> = row.iter().map(|c| c + eta).collect();
                RawTopic {
                    topic_id: t as i64,
                    terms: dtm.top_terms(&weights, TERMS_PER_TOPIC),
                }
            })
            .collect();

        Ok(Discovery {
            topics,
            document_topics: DocumentTopics::Distributions(theta),
        })
    }
}

/// A random point on the probability simplex of the given size.
pub(crate) fn random_simplex(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let mut v: Vec<f64> = (0..n).map(|_| 0.5 + rng.random::<f64>()).collect();
    let sum: f64 = v.iter().sum();
    if sum > 0.0 {
        v.iter_mut().for_each(|x| *x /= sum);
    }
    v
}
