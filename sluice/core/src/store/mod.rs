//! Store interfaces used by the stages.
//!
//! Stages never talk to a database driver directly. They receive a [`Connections`]
//! pair and go through the [`RelationalStore`] and [`AnalyticalStore`] traits, so the
//! same stage code runs against the embedded memory stores and the real ones.

use std::sync::Arc;

use async_trait::async_trait;
use datafusion::arrow::{array::RecordBatch, datatypes::SchemaRef};
use sluice_schemas::{AnalyticalStoreConfig, Pipeline, RelationalStoreConfig};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

pub mod memory;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;
#[cfg(feature = "odbc")]
pub mod odbc;

pub use memory::{MemoryAnalyticalStore, MemoryRelationalStore};

/// Transactional SQL store holding the sales table and the current aggregate
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Run a query and collect its result
    async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>>;

    /// Run a statement that returns no rows
    async fn execute(&self, sql: &str) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Replace the full contents of `table` with `batches`, creating it when absent.
    ///
    /// Readers observe either the previous contents or the new ones, never a mix.
    /// Returns the number of rows written.
    async fn replace_table(
        &self,
        table: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<u64>;

    /// Release the session, called exactly once per [`Connections`]
    async fn close(&self) -> Result<()>;
}

/// Append-only columnar store holding the aggregate mirror
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    /// Run a DDL or administrative command
    async fn command(&self, sql: &str) -> Result<()>;

    /// Append `batch` into `table` using the named columns.
    ///
    /// Columns of `table` not listed take their store-side default.
    /// Returns the number of rows written. A store that fails after writing part
    /// of the batch reports [`Error::PartialReplication`] with the rows it wrote.
    async fn insert(&self, table: &str, batch: &RecordBatch, column_names: &[&str]) -> Result<u64>;

    /// Release the session, called exactly once per [`Connections`]
    async fn close(&self) -> Result<()>;
}

/// The pair of store sessions a run works with.
///
/// Closing consumes the pair, so each session is released exactly once.
pub struct Connections {
    relational: Arc<dyn RelationalStore>,
    analytical: Arc<dyn AnalyticalStore>,
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections").finish_non_exhaustive()
    }
}

impl Connections {
    pub fn new(relational: Arc<dyn RelationalStore>, analytical: Arc<dyn AnalyticalStore>) -> Self {
        Self {
            relational,
            analytical,
        }
    }

    /// Open sessions to the stores configured in `pipeline`.
    ///
    /// When the analytical store cannot be reached the already opened relational
    /// session is released before the error is returned.
    #[instrument(skip_all, err)]
    pub async fn connect(pipeline: &Pipeline) -> Result<Self> {
        let relational = connect_relational(&pipeline.relational).await?;

        let analytical = match connect_analytical(&pipeline.analytical).await {
            Ok(analytical) => analytical,
            Err(err) => {
                if let Err(close_err) = relational.close().await {
                    warn!("Failed to release relational store: {close_err}");
                }
                return Err(err);
            }
        };

        Ok(Self::new(relational, analytical))
    }

    pub fn relational(&self) -> &dyn RelationalStore {
        self.relational.as_ref()
    }

    pub fn analytical(&self) -> &dyn AnalyticalStore {
        self.analytical.as_ref()
    }

    /// Release both sessions, returning the first failure
    #[instrument(skip_all, err)]
    pub async fn close(self) -> Result<()> {
        let relational = self.relational.close().await;
        let analytical = self.analytical.close().await;
        debug!("Released store sessions");

        relational.and(analytical)
    }
}

async fn connect_relational(config: &RelationalStoreConfig) -> Result<Arc<dyn RelationalStore>> {
    match config {
        RelationalStoreConfig::Memory => Ok(Arc::new(MemoryRelationalStore::default())),
        #[cfg(feature = "odbc")]
        RelationalStoreConfig::Odbc(odbc) => {
            Ok(Arc::new(odbc::OdbcRelationalStore::connect(odbc).await?))
        }
        #[cfg(not(feature = "odbc"))]
        RelationalStoreConfig::Odbc(_) => Err(Error::InvalidConfig(
            "ODBC relational store requested but this build lacks the `odbc` feature".into(),
        )),
    }
}

async fn connect_analytical(config: &AnalyticalStoreConfig) -> Result<Arc<dyn AnalyticalStore>> {
    match config {
        AnalyticalStoreConfig::Memory => Ok(Arc::new(MemoryAnalyticalStore::default())),
        #[cfg(feature = "clickhouse")]
        AnalyticalStoreConfig::Clickhouse(clickhouse) => Ok(Arc::new(
            clickhouse::ClickHouseAnalyticalStore::connect(clickhouse).await?,
        )),
        #[cfg(not(feature = "clickhouse"))]
        AnalyticalStoreConfig::Clickhouse(_) => Err(Error::InvalidConfig(
            "ClickHouse analytical store requested but this build lacks the `clickhouse` feature"
                .into(),
        )),
    }
}
