use std::sync::{Arc, OnceLock};

use arrow_odbc::odbc_api::{Connection, ConnectionOptions, Environment};
use arrow_odbc::{insert_into_table, OdbcReaderBuilder};
use datafusion::arrow::array::{RecordBatch, RecordBatchIterator};
use datafusion::arrow::datatypes::Schema;
use datafusion::arrow::error::ArrowError;
use tracing::{debug, error};

use crate::ddl::{create_table_statement, staging_table, validate_identifier};
use crate::error::{OdbcError, Result};

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    if let Some(environment) = ENVIRONMENT.get() {
        return Ok(environment);
    }

    let environment = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| environment))
}

/// A single ODBC connection held for the duration of a pipeline run.
///
/// All calls block the current thread, callers running on an async runtime
/// should move them onto a blocking thread.
pub struct OdbcConnection {
    connection: Connection<'static>,
    batch_size: usize,
}

impl std::fmt::Debug for OdbcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcConnection")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl OdbcConnection {
    /// Open a connection, `batch_size` bounds the rows sent per insert round trip
    pub fn connect(connection_string: &str, batch_size: usize) -> Result<Self> {
        let connection = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())?;

        Ok(Self {
            connection,
            batch_size: batch_size.max(1),
        })
    }

    /// Execute a statement that produces a result set and collect it as record batches
    pub fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        debug!("Running query: {sql}");

        let cursor = self
            .connection
            .execute(sql, (), None)?
            .ok_or(OdbcError::NoResultSet)?;

        let reader = OdbcReaderBuilder::new().build(cursor)?;

        let batches = reader
            .into_iter()
            .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()?;

        Ok(batches)
    }

    /// Execute a statement, discarding any result set
    pub fn execute(&self, sql: &str) -> Result<()> {
        debug!("Executing statement: {sql}");

        self.connection.execute(sql, (), None)?;

        Ok(())
    }

    /// Checks the catalog of the current database for a table
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let table = validate_identifier(table)?;

        // unquoted identifiers are folded to lower case
        let query = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = '{}'",
            table.to_lowercase()
        );

        let rows = self
            .query(query.as_str())?
            .iter()
            .map(|batch| batch.num_rows())
            .sum::<usize>();

        Ok(rows > 0)
    }

    /// Replace the contents of `table` with `batches`.
    ///
    /// The rows are written into a staging table first. Dropping the old table and
    /// renaming the staging table happen in one transaction, so readers observe
    /// either the previous contents or the complete new contents.
    pub fn replace_table(
        &self,
        table: &str,
        schema: Arc<Schema>,
        batches: Vec<RecordBatch>,
    ) -> Result<u64> {
        let table = validate_identifier(table)?;
        let staging = staging_table(table);
        let rows = batches.iter().map(|b| b.num_rows() as u64).sum::<u64>();

        self.execute(format!("DROP TABLE IF EXISTS {staging}").as_str())?;
        self.execute(create_table_statement(staging.as_str(), &schema)?.as_str())?;

        let mut record_batch_iterator =
            RecordBatchIterator::new(batches.into_iter().map(Ok), schema);

        if let Err(err) = insert_into_table(
            &self.connection,
            &mut record_batch_iterator,
            staging.as_str(),
            self.batch_size,
        ) {
            self.drop_staging(staging.as_str());
            return Err(err.into());
        }

        debug!("Staged {rows} rows into {staging}, swapping into {table}");

        self.connection.set_autocommit(false)?;

        let swap = || -> Result<()> {
            self.execute(format!("DROP TABLE IF EXISTS {table}").as_str())?;
            self.execute(format!("ALTER TABLE {staging} RENAME TO {table}").as_str())?;

            Ok(())
        };

        let result = match swap() {
            Ok(()) => self.connection.commit().map_err(OdbcError::from),
            Err(err) => {
                error!("ROLLBACK transaction: {err:?}");
                if let Err(rollback_err) = self.connection.rollback() {
                    error!("ROLLBACK failed: {rollback_err:?}");
                }
                Err(err)
            }
        };

        // restored on every path
        let restored = self.connection.set_autocommit(true).map_err(OdbcError::from);

        if result.is_err() {
            self.drop_staging(staging.as_str());
        }

        result.and(restored).map(|_| rows)
    }

    fn drop_staging(&self, staging: &str) {
        if let Err(err) = self.execute(format!("DROP TABLE IF EXISTS {staging}").as_str()) {
            error!("Failed to drop staging table {staging}: {err:?}");
        }
    }
}
