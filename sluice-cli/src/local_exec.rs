use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::Context;
use sluice_core::prelude::*;
use tracing::{debug, info, warn};

/// Load the pipeline at `file` and run it, or only `stage` when given
pub async fn run_local(
    file: PathBuf,
    params: HashMap<String, String>,
    stage: Option<StageName>,
) -> anyhow::Result<()> {
    info!("Running pipeline from file: {}", file.display());

    let pipeline = Pipeline::from_file(&file, params)
        .with_context(|| format!("failed to load pipeline definition {}", file.display()))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            on_signal.cancel();
        }
    });

    debug!("Connecting to stores");
    let connections = Connections::connect(&pipeline)
        .await
        .context("failed to connect to stores")?;

    let progress_tracker = Arc::new(LoggingProgressTracker);
    let summary = match stage {
        Some(stage) => {
            run_stage(connections, &pipeline, stage, Some(progress_tracker), cancel)
                .await
                .with_context(|| format!("failure during stage {stage}"))?
        }
        None => run_pipeline(connections, &pipeline, Some(progress_tracker), cancel)
            .await
            .context("failure during pipeline run")?,
    };

    debug!(
        "Run {} finished {} stage(s) in {:.2?}",
        summary.run_id,
        summary.stages.len(),
        summary.duration
    );
    Ok(())
}
