//! Progress event types for tracking pipeline execution

use serde::{Deserialize, Serialize};

/// Progress events emitted during a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Run started
    Started {
        /// Identifier of the run
        run_id: String,
    },
    /// A stage has started processing
    StageStarted {
        /// Name of the stage
        stage: String,
        /// Position of the stage in the run
        position: usize,
    },
    /// A stage has completed processing
    StageCompleted {
        /// Name of the stage
        stage: String,
        /// Position of the stage in the run
        position: usize,
        /// Rows written by the stage
        rows: u64,
        /// Duration of the stage execution
        duration_ms: u64,
    },
    /// A stage failed and the run was aborted
    Failed {
        /// Name of the failing stage, absent when the run failed between stages
        stage: Option<String>,
        /// Rendered error
        error: String,
    },
    /// Run completed
    Completed {
        /// Total duration of the run
        duration_ms: u64,
    },
}
