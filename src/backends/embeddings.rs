// Sentence embeddings for the embedding-clustering backend.
//
// Articles are embedded with a local multilingual MiniLM model through
// ONNX Runtime: tokenize, run the transformer, mean-pool token vectors
// under the attention mask. Documents that already carry a precomputed
// vector skip the model entirely.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

/// Output dimension of the MiniLM sentence models.
pub const EMBEDDING_DIM: usize = 384;

/// Subdirectory of the model dir holding the sentence model.
pub const EMBEDDING_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Default model location under the platform data directory.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rassegna")
        .join("models")
}

pub fn embedding_model_dir(base: &Path) -> PathBuf {
    base.join(EMBEDDING_MODEL_NAME)
}

/// Whether both `model.onnx` and `tokenizer.json` exist for the sentence model.
pub fn embedding_files_present(base: &Path) -> bool {
    let dir = embedding_model_dir(base);
    dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists()
}

/// Local sentence embedder. The session sits behind a Mutex because
/// inference needs `&mut Session`.
pub struct SentenceEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl SentenceEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from the embedding model dir
    /// under `base`.
    pub fn load(base: &Path) -> Result<Self> {
        let dir = embedding_model_dir(base);
        let model_path = dir.join("model.onnx");
        let tokenizer_path = dir.join("tokenizer.json");

        if !model_path.exists() || !tokenizer_path.exists() {
            anyhow::bail!(
                "Sentence model not found in {}\n\
                 Place model.onnx and tokenizer.json for {EMBEDDING_MODEL_NAME} there, \
                 or supply precomputed embeddings with the articles.",
                dir.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load sentence model from {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load sentence tokenizer: {}", e))?;

        debug!("Loaded sentence model from {}", dir.display());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed texts into mean-pooled vectors, one per text, in order.
    pub fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = texts
            .iter()
            .map(|t| {
                self.tokenizer
                    .encode(*t, true)
                    .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = encodings.len();
        let seq = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if seq == 0 {
            return Ok(vec![vec![0.0; EMBEDDING_DIM]; batch]);
        }

        // Right-pad every sequence with zeros (pad id 0, mask 0)
        let mut ids = vec![0i64; batch * seq];
        let mut mask = vec![0i64; batch * seq];
        for (i, enc) in encodings.iter().enumerate() {
            for (j, (&id, &m)) in enc.get_ids().iter().zip(enc.get_attention_mask()).enumerate() {
                ids[i * seq + j] = id as i64;
                mask[i * seq + j] = m as i64;
            }
        }
        let type_ids = vec![0i64; batch * seq];

        let shape = [batch as i64, seq as i64];
        let ids_tensor = Tensor::from_array((shape, ids)).context("Failed to create input_ids tensor")?;
        let mask_tensor = Tensor::from_array((shape, mask.clone()))
            .context("Failed to create attention_mask tensor")?;
        let type_tensor = Tensor::from_array((shape, type_ids))
            .context("Failed to create token_type_ids tensor")?;

        // last_hidden_state: [batch, seq, EMBEDDING_DIM]
        let hidden: Vec<f32> = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;
            let outputs = session
                .run(ort::inputs! {
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => type_tensor
                })
                .context("Sentence model inference failed")?;
            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .context("Failed to extract sentence model output")?;
            data.to_vec()
        };

        if hidden.len() < batch * seq * EMBEDDING_DIM {
            anyhow::bail!(
                "Sentence model returned {} values, expected {} ({batch}×{seq}×{EMBEDDING_DIM})",
                hidden.len(),
                batch * seq * EMBEDDING_DIM
            );
        }

        Ok((0..batch)
            .map(|i| mean_pool(&hidden, &mask, i, seq))
            .collect())
    }
}

/// Average the token vectors of sequence `i` where the mask is set.
fn mean_pool(hidden: &[f32], mask: &[i64], i: usize, seq: usize) -> Vec<f64> {
    let mut sum = vec![0.0_f64; EMBEDDING_DIM];
    let mut tokens = 0.0_f64;
    for j in 0..seq {
        if mask[i * seq + j] == 0 {
            continue;
        }
        tokens += 1.0;
        let offset = (i * seq + j) * EMBEDDING_DIM;
        for (acc, &v) in sum.iter_mut().zip(&hidden[offset..offset + EMBEDDING_DIM]) {
            *acc += v as f64;
        }
    }
    if tokens > 0.0 {
        sum.iter_mut().for_each(|v| *v /= tokens);
    }
    sum
}

/// Scale a vector to unit length. Zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity in [-1, 1]; 0 for empty, zero, or mismatched vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    let denom = na * nb;
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
