//! Pipeline execution logic

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use sluice_schemas::{Pipeline, ProgressEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::progress_tracker::ProgressTracker;
use crate::stages::{build_stage, StageName, StageProvider, StageReport};
use crate::store::Connections;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Completed stages in execution order
    pub stages: Vec<(StageName, StageReport)>,
    pub duration: Duration,
}

impl RunSummary {
    /// Rows written by `stage`, if it ran
    pub fn rows(&self, stage: StageName) -> Option<u64> {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, report)| report.rows)
    }
}

/// Execute all four stages in order: load, aggregate, ensure mirror, replicate.
///
/// The run stops at the first failing stage and reports that stage's error.
/// `cancel` is checked before each stage. The connections are released exactly
/// once, whether the run succeeds or fails.
pub async fn run_pipeline(
    connections: Connections,
    pipeline: &Pipeline,
    progress_tracker: Option<Arc<dyn ProgressTracker>>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    run_stages(
        connections,
        pipeline,
        &StageName::ALL,
        progress_tracker,
        cancel,
    )
    .await
}

/// Execute a single stage with the same release and progress guarantees as [`run_pipeline`]
pub async fn run_stage(
    connections: Connections,
    pipeline: &Pipeline,
    stage: StageName,
    progress_tracker: Option<Arc<dyn ProgressTracker>>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    run_stages(connections, pipeline, &[stage], progress_tracker, cancel).await
}

async fn run_stages(
    connections: Connections,
    pipeline: &Pipeline,
    stages: &[StageName],
    progress_tracker: Option<Arc<dyn ProgressTracker>>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let run = Run {
        id: Uuid::new_v4(),
        start: Instant::now(),
        tracker: progress_tracker,
    };

    let outcome = run.execute(&connections, pipeline, stages, &cancel).await;
    let released = connections.close().await;

    match (outcome, released) {
        (Ok(completed), Ok(())) => {
            let duration = run.start.elapsed();
            run.emit(ProgressEvent::Completed {
                duration_ms: duration.as_millis() as u64,
            });

            Ok(RunSummary {
                run_id: run.id,
                stages: completed,
                duration,
            })
        }
        (Ok(_), Err(err)) => {
            run.emit(ProgressEvent::Failed {
                stage: None,
                error: err.to_string(),
            });
            Err(err)
        }
        (Err(err), released) => {
            if let Err(close_err) = released {
                warn!("Failed to release connections after failed run: {close_err}");
            }
            Err(err)
        }
    }
}

struct Run {
    id: Uuid,
    start: Instant,
    tracker: Option<Arc<dyn ProgressTracker>>,
}

impl Run {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tracker) = &self.tracker {
            tracker.on_progress(event);
        }
    }

    #[instrument(name = "run", skip_all, fields(run_id = %self.id), err)]
    async fn execute(
        &self,
        connections: &Connections,
        pipeline: &Pipeline,
        stages: &[StageName],
        cancel: &CancellationToken,
    ) -> Result<Vec<(StageName, StageReport)>> {
        self.emit(ProgressEvent::Started {
            run_id: self.id.to_string(),
        });

        let providers = stages
            .iter()
            .map(|name| build_stage(*name, pipeline))
            .collect::<Result<Vec<Box<dyn StageProvider>>>>()
            .inspect_err(|err| {
                self.emit(ProgressEvent::Failed {
                    stage: None,
                    error: err.to_string(),
                })
            })?;

        let timeout = pipeline.stage_timeout_secs.map(Duration::from_secs);
        let mut completed = Vec::with_capacity(providers.len());

        for (position, stage) in providers.iter().enumerate() {
            let name = stage.name();

            let result = if cancel.is_cancelled() {
                Err(Error::Cancelled {
                    stage: name.to_string(),
                })
            } else {
                self.emit(ProgressEvent::StageStarted {
                    stage: name.to_string(),
                    position,
                });
                self.execute_stage(stage.as_ref(), connections, timeout)
                    .await
            };

            match result {
                Ok((report, elapsed)) => {
                    self.emit(ProgressEvent::StageCompleted {
                        stage: name.to_string(),
                        position,
                        rows: report.rows,
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    completed.push((name, report));
                }
                Err(err) => {
                    self.emit(ProgressEvent::Failed {
                        stage: Some(name.to_string()),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            }
        }

        Ok(completed)
    }

    async fn execute_stage(
        &self,
        stage: &dyn StageProvider,
        connections: &Connections,
        timeout: Option<Duration>,
    ) -> Result<(StageReport, Duration)> {
        let time = Instant::now();
        let name = stage.name();
        debug!("Running stage {name}");

        let report = match timeout {
            Some(limit) => tokio::time::timeout(limit, stage.execute(connections))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout {
                        stage: name.to_string(),
                        timeout: limit,
                    })
                })?,
            None => stage.execute(connections).await?,
        };

        let elapsed = time.elapsed();
        debug!(
            "Finished stage {name} ({} rows) ... Elapsed time: {:.2?}",
            report.rows, elapsed
        );

        Ok((report, elapsed))
    }
}
