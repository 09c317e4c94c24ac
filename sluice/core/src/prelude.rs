//! Prelude module that exports commonly used types and functions.
//!
//! `use sluice_core::prelude::*;` brings in everything needed to load a
//! pipeline definition and run it.

pub use crate::error::{CastError, Error, Result, StoreKind};

pub use sluice_schemas::{Pipeline, ProgressEvent};

pub use crate::pipeline::{
    run_pipeline, run_stage, LoggingProgressTracker, ProgressTracker, RunSummary,
};

pub use crate::stages::{StageName, StageProvider, StageReport};

pub use crate::store::{AnalyticalStore, Connections, RelationalStore};

pub use crate::templating::{TemplateFormat, TemplateLoader};

pub use tokio_util::sync::CancellationToken;
