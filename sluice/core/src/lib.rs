//! # Sluice Core
//!
//! Stages and runner of the sluice sales pipeline: a raw sales file is cast and
//! loaded into a relational store, aggregated per product and region, and the
//! aggregate is appended to a mirror table in an analytical store.
//!
//! ```rust,no_run
//! use sluice_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> sluice_core::Result<()> {
//! let pipeline = Pipeline::from_file("pipeline.yml", Default::default())?;
//! let connections = Connections::connect(&pipeline).await?;
//!
//! let summary = run_pipeline(
//!     connections,
//!     &pipeline,
//!     Some(Arc::new(LoggingProgressTracker)),
//!     CancellationToken::new(),
//! )
//! .await?;
//!
//! println!("replicated {:?} rows", summary.rows(StageName::Replicate));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `yaml` (default), `json`, `toml`: pipeline definition formats
//! - `odbc`: relational store reached through an ODBC driver
//! - `clickhouse`: analytical store reached over the ClickHouse HTTP interface

pub mod error;
pub mod generator;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod stages;
pub mod store;
pub mod templating;

pub use error::{Error, Result};
