// NMF backend: multiplicative-update factorization of a TF-IDF matrix.
//
// X (documents × terms) ≈ W (documents × k) · H (k × terms), all entries
// non-negative. Rows of H are topics, rows of W are document weights.
// Updates are the Lee–Seung Frobenius rules, computed against the sparse
// X so memory stays proportional to the number of non-zeros.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::vocabulary::{tfidf_matrix, VocabularyOptions};
use crate::topics::document::Document;
use crate::topics::traits::{Algorithm, Discovery, DocumentTopics, RawTopic, TopicBackend};

const TERMS_PER_TOPIC: usize = 20;
const EPSILON: f64 = 1e-10;

pub struct NmfBackend {
    pub vocabulary: VocabularyOptions,
    pub max_iter: usize,
    /// Relative improvement in reconstruction error below which we stop
    pub tolerance: f64,
    pub seed: u64,
}

impl NmfBackend {
    pub fn new(vocabulary: VocabularyOptions, seed: u64) -> Self {
        Self {
            vocabulary,
            max_iter: 200,
            tolerance: 1e-4,
            seed,
        }
    }
}

impl TopicBackend for NmfBackend {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Nmf
    }

    fn discover(&self, documents: &[&Document], k: usize) -> Result<Discovery> {
        if k == 0 {
            anyhow::bail!("NMF needs at least one topic");
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let x = tfidf_matrix(&texts, &self.vocabulary)?;
        let n = x.rows.len();
        let m = x.n_terms();

        info!(documents = n, terms = m, topics = k, "Fitting NMF");

        let nnz_sum: f64 = x.rows.iter().flatten().map(|(_, v)| v).sum();
        let x_norm_sq: f64 = x.rows.iter().flatten().map(|(_, v)| v * v).sum();
        let scale = (nnz_sum / (n * m) as f64 / k as f64).sqrt();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut w: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..k).map(|_| scale * rng.random::<f64>() + EPSILON).collect())
            .collect();
        let mut h: Vec<Vec<f64>> = (0..k)
            .map(|_| (0..m).map(|_| scale * rng.random::<f64>() + EPSILON).collect())
            .collect();

        let mut initial_error: Option<f64> = None;
        let mut previous_error = f64::INFINITY;

        for iteration in 0..self.max_iter {
            // H <- H * (W^T X) / (W^T W H)
            let mut wtx = vec![vec![0.0; m]; k];
            for (d, row) in x.rows.iter().enumerate() {
                for &(v, value) in row {
                    for t in 0..k {
                        wtx[t][v] += w[d][t] * value;
                    }
                }
            }
            let wtw = gram_columns(&w, k);
            for t in 0..k {
                for v in 0..m {
                    let denom: f64 = (0..k).map(|s| wtw[t][s] * h[s][v]).sum::<f64>() + EPSILON;
                    h[t][v] *= wtx[t][v] / denom;
                }
            }

            // W <- W * (X H^T) / (W H H^T)
            let xht = sparse_times_transpose(&x.rows, &h, k);
            let hht = gram_rows(&h);
            for d in 0..n {
                for t in 0..k {
                    let denom: f64 = (0..k).map(|s| w[d][s] * hht[s][t]).sum::<f64>() + EPSILON;
                    w[d][t] *= xht[d][t] / denom;
                }
            }

            if iteration % 10 == 9 {
                let error = reconstruction_error(x_norm_sq, &x.rows, &w, &h);
                let initial = *initial_error.get_or_insert(error);
                if initial > 0.0 && (previous_error - error) / initial < self.tolerance {
                    debug!(iteration, error, "NMF converged");
                    break;
                }
                previous_error = error;
            }
        }

        let topics = h
            .iter()
            .enumerate()
            .map(|(t, row)| RawTopic {
                topic_id: t as i64,
                terms: x.top_terms(row, TERMS_PER_TOPIC),
            })
            .collect();

        Ok(Discovery {
            topics,
            document_topics: DocumentTopics::Distributions(w),
        })
    }
}

/// W^T W for an (n × k) matrix.
fn gram_columns(w: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut g = vec![vec![0.0; k]; k];
    for row in w {
        for a in 0..k {
            for b in 0..k {
                g[a][b] += row[a] * row[b];
            }
        }
    }
    g
}

/// H H^T for a (k × m) matrix.
fn gram_rows(h: &[Vec<f64>]) -> Vec<Vec<f64>> {
    h.iter()
        .map(|a| h.iter().map(|b| a.iter().zip(b).map(|(x, y)| x * y).sum()).collect())
        .collect()
}

/// X H^T for sparse X (n × m) and dense H (k × m).
fn sparse_times_transpose(rows: &[Vec<(usize, f64)>], h: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|row| {
            (0..k)
                .map(|t| row.iter().map(|&(v, value)| value * h[t][v]).sum())
                .collect()
        })
        .collect()
}

/// ||X - WH||² expanded so X stays sparse:
/// ||X||² - 2·tr(Wᵀ X Hᵀ) + tr((WᵀW)(HHᵀ)).
fn reconstruction_error(x_norm_sq: f64, rows: &[Vec<(usize, f64)>], w: &[Vec<f64>], h: &[Vec<f64>]) -> f64 {
    let k = h.len();
    let xht = sparse_times_transpose(rows, h, k);
    let cross: f64 = w
        .iter()
        .zip(&xht)
        .map(|(wr, xr)| wr.iter().zip(xr).map(|(a, b)| a * b).sum::<f64>())
        .sum();
    let wtw = gram_columns(w, k);
    let hht = gram_rows(h);
    let quad: f64 = (0..k)
        .flat_map(|a| (0..k).map(move |b| (a, b)))
        .map(|(a, b)| wtw[a][b] * hht[a][b])
        .sum();
    (x_norm_sq - 2.0 * cross + quad).max(0.0)
}
