// Batch runs: many (date, algorithm) jobs, bounded concurrency.
//
// Each job runs its backend chain on a blocking thread, then persists
// through the shared store. Jobs only share the read-only documents (via
// Arc) and the store; a failed job is reported and never stops the others.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::run::{persist, run_with_fallback, RunContext, RunOutcome};
use crate::db::ResultStore;
use crate::topics::error::PipelineError;
use crate::topics::traits::{Algorithm, TopicBackend};
use crate::topics::ResultKey;

/// Builds a backend for an algorithm. Called once per attempt, on the
/// blocking thread that runs it.
pub type BackendFactory = Arc<dyn Fn(Algorithm) -> Result<Box<dyn TopicBackend>> + Send + Sync>;

/// One unit of batch work.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub context: RunContext,
    pub algorithm: Algorithm,
}

impl BatchJob {
    /// The key the job was asked to produce. With fallback, the stored
    /// key may name a different algorithm.
    pub fn requested_key(&self) -> ResultKey {
        ResultKey::new(self.context.run_date, self.algorithm)
    }
}

/// Options shared by every job in a batch.
#[derive(Clone)]
pub struct BatchOptions {
    pub fallback: Vec<Algorithm>,
    pub concurrency: usize,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            fallback: Vec::new(),
            concurrency: 2,
            show_progress: false,
        }
    }
}

/// What happened to one job.
#[derive(Debug)]
pub struct JobReport {
    pub requested: ResultKey,
    pub outcome: Result<RunOutcome, PipelineError>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run every job, persisting successful results to `store` when given.
/// Reports come back sorted by requested date, then algorithm.
pub async fn run_batch(
    jobs: Vec<BatchJob>,
    factory: BackendFactory,
    store: Option<Arc<dyn ResultStore>>,
    options: &BatchOptions,
) -> Vec<JobReport> {
    let pb = if options.show_progress {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  Modeling [{bar:30}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let concurrency = options.concurrency.max(1);
    info!(jobs = jobs.len(), concurrency, "Starting batch");

    let mut reports: Vec<JobReport> = stream::iter(jobs.into_iter().map(|job| {
        let factory = factory.clone();
        let store = store.clone();
        let fallback = options.fallback.clone();
        let pb = pb.clone();
        async move {
            let report = run_job(job, factory, store, fallback).await;
            pb.inc(1);
            report
        }
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    pb.finish_and_clear();

    reports.sort_by_key(|r| r.requested);
    let failed = reports.iter().filter(|r| !r.is_success()).count();
    info!(succeeded = reports.len() - failed, failed, "Batch complete");
    reports
}

async fn run_job(
    job: BatchJob,
    factory: BackendFactory,
    store: Option<Arc<dyn ResultStore>>,
    fallback: Vec<Algorithm>,
) -> JobReport {
    let requested = job.requested_key();
    let algorithm = job.algorithm;

    let outcome = match tokio::task::spawn_blocking(move || {
        run_with_fallback(algorithm, &fallback, |alg| factory(alg), &job.context)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => Err(PipelineError::backend(algorithm, format!("run task failed: {e}"))),
    };

    let outcome = match (outcome, store) {
        (Ok(mut run), Some(store)) => match persist(store.as_ref(), run.result).await {
            Ok(result) => {
                run.result = result;
                Ok(run)
            }
            Err(e) => Err(e),
        },
        (outcome, _) => outcome,
    };

    if let Err(e) = &outcome {
        warn!(key = %requested, kind = e.kind(), error = %e, "Topic run failed");
    }
    JobReport { requested, outcome }
}
