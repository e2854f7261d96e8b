// Pipeline drivers: a single run, fallback chains, and concurrent batches.

pub mod batch;
pub mod run;

pub use batch::{run_batch, BackendFactory, BatchJob, BatchOptions, JobReport};
pub use run::{persist, run, run_with_fallback, RunContext, RunOutcome};
