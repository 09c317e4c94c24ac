//! Relational store reached through an ODBC driver.
//!
//! ODBC calls block, so every call is moved onto the blocking thread pool.
//! This keeps stage timeouts and cancellation responsive.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use datafusion::arrow::{array::RecordBatch, datatypes::SchemaRef};
use sluice_odbc::{OdbcConnection, OdbcError};
use sluice_schemas::OdbcConfig;
use tracing::{debug, instrument};

use super::RelationalStore;
use crate::error::{Error, Result, StoreKind};

pub struct OdbcRelationalStore {
    connection: Arc<Mutex<Option<OdbcConnection>>>,
}

impl std::fmt::Debug for OdbcRelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcRelationalStore").finish_non_exhaustive()
    }
}

fn map_error(err: OdbcError) -> Error {
    if err.is_connection_failure() {
        return Error::unavailable(StoreKind::Relational, err);
    }

    match err {
        OdbcError::InvalidIdentifier(table) => {
            Error::InvalidConfig(format!("'{table}' is not a valid table name"))
        }
        OdbcError::UnsupportedType { column, data_type } => Error::schema_mismatch(
            column,
            format!("type {data_type} has no relational mapping"),
        ),
        other => Error::statement(StoreKind::Relational, other),
    }
}

impl OdbcRelationalStore {
    #[instrument(skip_all, err)]
    pub async fn connect(config: &OdbcConfig) -> Result<Self> {
        let connection_string = config.connection_string.clone();
        let batch_size = config.batch_size;

        let connection = tokio::task::spawn_blocking(move || {
            OdbcConnection::connect(connection_string.as_str(), batch_size)
        })
        .await
        .map_err(|err| Error::Fatal(format!("ODBC connect task failed: {err}")))?
        .map_err(|err| Error::unavailable(StoreKind::Relational, err))?;

        debug!("Opened ODBC session");

        Ok(Self {
            connection: Arc::new(Mutex::new(Some(connection))),
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&OdbcConnection) -> sluice_odbc::Result<T> + Send + 'static,
    {
        let connection = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| Error::Fatal("ODBC session lock poisoned".into()))?;
            let connection = guard.as_ref().ok_or_else(|| map_error(OdbcError::Closed))?;

            f(connection).map_err(map_error)
        })
        .await
        .map_err(|err| Error::Fatal(format!("ODBC task failed: {err}")))?
    }
}

#[async_trait]
impl RelationalStore for OdbcRelationalStore {
    #[instrument(skip(self), err)]
    async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let sql = sql.to_string();
        self.with_connection(move |conn| conn.query(sql.as_str())).await
    }

    #[instrument(skip(self), err)]
    async fn execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_connection(move |conn| conn.execute(sql.as_str())).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.with_connection(move |conn| conn.table_exists(table.as_str()))
            .await
    }

    #[instrument(skip(self, schema, batches), err)]
    async fn replace_table(
        &self,
        table: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<u64> {
        let table = table.to_string();
        self.with_connection(move |conn| conn.replace_table(table.as_str(), schema, batches))
            .await
    }

    async fn close(&self) -> Result<()> {
        let connection = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| Error::Fatal("ODBC session lock poisoned".into()))?;
            if guard.take().is_some() {
                debug!("Closed ODBC session");
            }
            Ok(())
        })
        .await
        .map_err(|err| Error::Fatal(format!("ODBC task failed: {err}")))?
    }
}
