// Reference topic backends.
//
// Three interchangeable implementations of `TopicBackend`: LDA over term
// counts, NMF over TF-IDF, and sentence-embedding clustering. Callers pick
// one with `Algorithm`; nothing here probes the environment to decide.

pub mod bertopic;
pub mod embeddings;
pub mod lda;
pub mod nmf;
pub mod vocabulary;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::topics::traits::{Algorithm, TopicBackend};
use vocabulary::{Language, VocabularyOptions};

/// Default RNG seed for the factorization backends.
pub const DEFAULT_SEED: u64 = 42;

/// Everything needed to construct any backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub language: Language,
    pub model_dir: PathBuf,
    pub seed: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            language: Language::Italian,
            model_dir: embeddings::default_model_dir(),
            seed: DEFAULT_SEED,
        }
    }
}

/// Build the backend for an algorithm.
///
/// The embedding backend loads the sentence model when its files are
/// present; without them it still runs on documents that carry
/// precomputed embeddings.
pub fn create_backend(algorithm: Algorithm, settings: &BackendSettings) -> Result<Box<dyn TopicBackend>> {
    match algorithm {
        Algorithm::Lda => {
            info!(seed = settings.seed, "Using LDA topic backend");
            Ok(Box::new(lda::LdaBackend::new(
                VocabularyOptions::new(settings.language),
                settings.seed,
            )))
        }
        Algorithm::Nmf => {
            info!(seed = settings.seed, "Using NMF topic backend");
            Ok(Box::new(nmf::NmfBackend::new(
                VocabularyOptions::new(settings.language),
                settings.seed,
            )))
        }
        Algorithm::Bertopic => {
            let embedder = if embeddings::embedding_files_present(&settings.model_dir) {
                info!(model_dir = %settings.model_dir.display(), "Using embedding-clustering backend");
                Some(embeddings::SentenceEmbedder::load(&settings.model_dir)?)
            } else {
                warn!(
                    model_dir = %settings.model_dir.display(),
                    "Sentence model not found; only precomputed embeddings can be clustered"
                );
                None
            };
            Ok(Box::new(bertopic::BertopicBackend::new(
                embedder,
                settings.language.stop_words(),
            )))
        }
    }
}
