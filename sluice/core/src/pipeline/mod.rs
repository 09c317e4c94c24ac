//! Pipeline execution with progress reporting

pub mod progress_tracker;
pub mod run;

pub use progress_tracker::{LoggingProgressTracker, ProgressTracker};
pub use run::{run_pipeline, run_stage, RunSummary};
