//! Analytical store backed by a ClickHouse server.

use async_trait::async_trait;
use datafusion::arrow::array::RecordBatch;
use sluice_clickhouse::{ClickHouseClient, ClickHouseError};
use sluice_schemas::ClickHouseConfig;
use tracing::{debug, instrument};

use super::AnalyticalStore;
use crate::error::{Error, Result, StoreKind};

#[derive(Debug)]
pub struct ClickHouseAnalyticalStore {
    client: ClickHouseClient,
}

fn map_error(table: Option<&str>, err: ClickHouseError) -> Error {
    if err.is_connection_failure() {
        Error::unavailable(StoreKind::Analytical, err)
    } else if err.is_unknown_table() {
        Error::PrecursorMissing(err.to_string())
    } else if err.is_schema_mismatch() {
        Error::schema_mismatch(table.unwrap_or("<command>"), err.to_string())
    } else {
        Error::statement(StoreKind::Analytical, err)
    }
}

/// An insert with an unknown outcome may still have stored the chunk
fn map_insert_error(table: &str, err: ClickHouseError) -> Error {
    match &err {
        ClickHouseError::InsertOutcomeUnknown { rows, .. } => Error::PartialReplication {
            table: table.to_string(),
            expected: *rows,
            written: 0,
            reason: format!("{err}, the rows may have been committed"),
        },
        _ => map_error(Some(table), err),
    }
}

impl ClickHouseAnalyticalStore {
    /// Build a client and check the server answers
    #[instrument(skip_all, fields(url = %config.url), err)]
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let client = ClickHouseClient::new(config).map_err(|err| map_error(None, err))?;
        client
            .ping()
            .await
            .map_err(|err| Error::unavailable(StoreKind::Analytical, err))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AnalyticalStore for ClickHouseAnalyticalStore {
    async fn command(&self, sql: &str) -> Result<()> {
        self.client
            .command(sql)
            .await
            .map_err(|err| map_error(None, err))
    }

    async fn insert(&self, table: &str, batch: &RecordBatch, column_names: &[&str]) -> Result<u64> {
        self.client
            .insert(table, column_names, batch)
            .await
            .map_err(|err| map_insert_error(table, err))
    }

    async fn close(&self) -> Result<()> {
        // HTTP sessions are per request, nothing is held open
        debug!("Released ClickHouse client");
        Ok(())
    }
}
