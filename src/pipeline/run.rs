// One pipeline run: discover → normalize → assign → aggregate → compose.
//
// Everything a run needs arrives in a `RunContext`; nothing is kept between
// runs. Backend errors and panics become `BackendFailure` here, so callers
// only ever see the four `PipelineError` variants.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::db::ResultStore;
use crate::topics::aggregate::aggregate;
use crate::topics::assign::assign;
use crate::topics::compose::{compose, RunMeta, TopicModelResult};
use crate::topics::document::{usable_indices, Document};
use crate::topics::error::PipelineError;
use crate::topics::normalize::normalize;
use crate::topics::traits::{Algorithm, TopicBackend};

/// Inputs for one run. Cloning shares the documents.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_date: NaiveDate,
    /// Requested topic count; advisory for backends that pick their own
    pub n_topics: usize,
    pub documents: Arc<Vec<Document>>,
    /// Sources that appear in the matrix even with zero articles
    pub declared_sources: Arc<Vec<String>>,
}

impl RunContext {
    pub fn new(run_date: NaiveDate, n_topics: usize, documents: Vec<Document>) -> Self {
        Self {
            run_date,
            n_topics,
            documents: Arc::new(documents),
            declared_sources: Arc::new(Vec::new()),
        }
    }

    pub fn with_declared_sources(mut self, sources: Vec<String>) -> Self {
        self.declared_sources = Arc::new(sources);
        self
    }
}

/// Run the pipeline once with the given backend.
///
/// The result's `algorithm` is always the backend's own.
pub fn run(backend: &dyn TopicBackend, ctx: &RunContext) -> Result<TopicModelResult, PipelineError> {
    let algorithm = backend.algorithm();
    let documents = ctx.documents.as_slice();

    let usable = usable_indices(documents);
    if usable.is_empty() {
        return Err(PipelineError::EmptyCorpus {
            supplied: documents.len(),
        });
    }
    if ctx.n_topics == 0 && algorithm.honors_topic_count() {
        return Err(PipelineError::backend(algorithm, "requested topic count must be positive"));
    }

    info!(
        %algorithm,
        date = %ctx.run_date,
        documents = documents.len(),
        usable = usable.len(),
        n_topics = ctx.n_topics,
        "Starting topic run"
    );

    let corpus: Vec<&Document> = usable.iter().map(|&i| &documents[i]).collect();
    let discovery = match catch_unwind(AssertUnwindSafe(|| backend.discover(&corpus, ctx.n_topics))) {
        Ok(Ok(discovery)) => discovery,
        Ok(Err(e)) => return Err(PipelineError::backend(algorithm, format!("{e:#}"))),
        Err(payload) => return Err(PipelineError::backend(algorithm, panic_message(payload.as_ref()))),
    };

    if discovery.document_topics.len() < corpus.len() {
        warn!(
            %algorithm,
            rows = discovery.document_topics.len(),
            documents = corpus.len(),
            "Backend returned fewer document rows than documents; the rest stay unassigned"
        );
    }

    let normalized = normalize(&discovery.topics, backend.outlier_label())
        .map_err(|e| PipelineError::backend(algorithm, format!("{e:#}")))?;
    if normalized.is_empty() {
        return Err(PipelineError::backend(algorithm, "backend produced no topics"));
    }

    let assignments = assign(&usable, &discovery.document_topics, &normalized);
    let matrix = aggregate(documents, &assignments, normalized.len(), &ctx.declared_sources);

    let meta = RunMeta {
        run_date: ctx.run_date,
        algorithm,
    };
    let result = compose(meta, documents, normalized.topics, &assignments, &matrix)?;

    info!(
        %algorithm,
        date = %ctx.run_date,
        topics = result.num_topics,
        assigned = result.assigned_count(),
        "Topic run complete"
    );
    Ok(result)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("backend panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("backend panicked: {s}")
    } else {
        "backend panicked".to_string()
    }
}

/// A successful run, with the backends that failed on the way to it.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: TopicModelResult,
    /// The backend the caller asked for first
    pub requested: Algorithm,
    /// The backend that produced `result`
    pub ran: Algorithm,
    /// `BackendFailure`s from earlier entries in the preference list
    pub failures: Vec<PipelineError>,
}

impl RunOutcome {
    pub fn fell_back(&self) -> bool {
        self.ran != self.requested
    }
}

/// Try `primary`, then each `fallback` in order, until one succeeds.
///
/// Only `BackendFailure` moves on to the next backend; `EmptyCorpus` and
/// `CompositionError` stop the chain, since another backend would see the
/// same input. When every backend fails, the last failure is returned.
pub fn run_with_fallback<F>(
    primary: Algorithm,
    fallback: &[Algorithm],
    factory: F,
    ctx: &RunContext,
) -> Result<RunOutcome, PipelineError>
where
    F: Fn(Algorithm) -> Result<Box<dyn TopicBackend>>,
{
    let mut chain = vec![primary];
    for &alg in fallback {
        if !chain.contains(&alg) {
            chain.push(alg);
        }
    }

    let mut failures: Vec<PipelineError> = Vec::new();
    for algorithm in chain {
        let attempt = match factory(algorithm) {
            Ok(backend) => run(backend.as_ref(), ctx),
            Err(e) => Err(PipelineError::backend(algorithm, format!("{e:#}"))),
        };
        match attempt {
            Ok(result) => {
                if algorithm != primary {
                    info!(requested = %primary, ran = %algorithm, "Fell back to another backend");
                }
                return Ok(RunOutcome {
                    result,
                    requested: primary,
                    ran: algorithm,
                    failures,
                });
            }
            Err(e @ PipelineError::BackendFailure { .. }) => {
                warn!(%algorithm, error = %e, "Backend failed");
                failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    // chain is never empty, so at least one failure was recorded
    Err(failures
        .pop()
        .unwrap_or_else(|| PipelineError::backend(primary, "no backend was attempted")))
}

/// Store a composed result. On failure the result comes back inside the
/// error so the caller can still use it.
pub async fn persist(store: &dyn ResultStore, result: TopicModelResult) -> Result<TopicModelResult, PipelineError> {
    match store.save_result(&result).await {
        Ok(()) => {
            info!(key = %result.key(), "Stored topic result");
            Ok(result)
        }
        Err(e) => Err(PipelineError::PersistenceFailure {
            key: result.key(),
            reason: format!("{e:#}"),
            result: Box::new(result),
        }),
    }
}
