use sluice_schemas::ProgressEvent;
use tracing::{error, info, instrument};

/// A trait for handling progress events during a pipeline run.
///
/// Implement this to forward progress to a UI, a scheduler or a metrics sink.
///
/// # Examples
///
/// ```rust
/// use sluice_core::pipeline::ProgressTracker;
/// use sluice_schemas::ProgressEvent;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct RowCounter {
///     rows: Mutex<u64>,
/// }
///
/// impl ProgressTracker for RowCounter {
///     fn on_progress(&self, event: ProgressEvent) {
///         if let ProgressEvent::StageCompleted { rows, .. } = event {
///             *self.rows.lock().unwrap() += rows;
///         }
///     }
/// }
/// ```
pub trait ProgressTracker: Send + Sync {
    /// Called for every event, in the order the events happen
    fn on_progress(&self, event: ProgressEvent);
}

/// Progress tracker that writes every event to the `tracing` log
#[derive(Debug, Default)]
pub struct LoggingProgressTracker;

impl ProgressTracker for LoggingProgressTracker {
    #[instrument(skip_all)]
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id } => {
                info!("🚀 Pipeline run {run_id} started");
            }
            ProgressEvent::StageStarted { stage, position } => {
                info!("⚙️  Processing stage: {stage} (position: {position})");
            }
            ProgressEvent::StageCompleted {
                stage,
                rows,
                duration_ms,
                ..
            } => {
                info!(
                    "✅ Completed stage: {stage} ({rows} rows, took: {:.2}s)",
                    duration_ms as f64 / 1000.0
                );
            }
            ProgressEvent::Failed { stage, error } => match stage {
                Some(stage) => error!("❌ Stage {stage} failed: {error}"),
                None => error!("❌ Pipeline run failed: {error}"),
            },
            ProgressEvent::Completed { duration_ms } => {
                info!(
                    "🎉 Pipeline run completed (total time: {:.2}s)",
                    duration_ms as f64 / 1000.0
                );
            }
        }
    }
}
