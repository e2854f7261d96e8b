// Pipeline error taxonomy.
//
// Everything below the pipeline boundary uses anyhow; everything that
// crosses it is one of these four variants so callers can decide what
// to skip, what to log, and what must halt.

use thiserror::Error;

use super::compose::{ResultKey, TopicModelResult};
use super::traits::Algorithm;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No document had usable text. The run is skipped, nothing is stored.
    #[error("no usable documents: all {supplied} supplied documents have empty text")]
    EmptyCorpus { supplied: usize },

    /// The discovery algorithm could not produce topics.
    #[error("{algorithm} backend failed: {reason}")]
    BackendFailure { algorithm: Algorithm, reason: String },

    /// An internal invariant was violated while composing the result.
    #[error("result composition failed: {0}")]
    CompositionError(String),

    /// The store rejected the write. The composed result rides along so
    /// the caller still has it.
    #[error("failed to persist {key}: {reason}")]
    PersistenceFailure {
        key: ResultKey,
        reason: String,
        result: Box<TopicModelResult>,
    },
}

impl PipelineError {
    pub fn backend(algorithm: Algorithm, reason: impl Into<String>) -> Self {
        PipelineError::BackendFailure {
            algorithm,
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name, used in logs and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EmptyCorpus { .. } => "empty_corpus",
            PipelineError::BackendFailure { .. } => "backend_failure",
            PipelineError::CompositionError(_) => "composition_error",
            PipelineError::PersistenceFailure { .. } => "persistence_failure",
        }
    }

    /// The composed result, if the failure happened after composition.
    pub fn into_result(self) -> Option<TopicModelResult> {
        match self {
            PipelineError::PersistenceFailure { result, .. } => Some(*result),
            _ => None,
        }
    }
}
