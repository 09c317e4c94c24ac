//! Store connection configuration.
//!
//! The relational store owns `sales_data` and the current aggregate, the analytical
//! store owns the mirror table. Both default to embedded in-memory stores so a
//! pipeline definition without connection details can run locally.

use crate::serde_helpers::{
    default_batch_size, default_clickhouse_database, default_clickhouse_user,
};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relational store backing the loader and aggregator.
///
/// # Examples
///
/// ```
/// use sluice_schemas::{OdbcConfig, RelationalStoreConfig};
///
/// let store = RelationalStoreConfig::Odbc(
///     OdbcConfig::builder()
///         .connection_string("Driver={PostgreSQL Unicode};Server=localhost;".to_string())
///         .build(),
/// );
///
/// if let RelationalStoreConfig::Odbc(odbc) = &store {
///     assert_eq!(odbc.batch_size, 1000);
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum RelationalStoreConfig {
    /// Embedded DataFusion context, lives as long as the process
    #[default]
    #[serde(alias = "in_memory", alias = "Memory")]
    Memory,
    /// Database reachable through an ODBC driver (e.g. PostgreSQL)
    #[serde(alias = "postgres", alias = "Odbc")]
    Odbc(OdbcConfig),
}

/// ODBC connection settings
#[derive(Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct OdbcConfig {
    /// ODBC connection string
    /// Please reference the respective database connection string syntax (e.g. <https://www.connectionstrings.com/postgresql-odbc-driver-psqlodbc/>)
    pub connection_string: String,

    /// Rows per insert round trip (defaults to 1000)
    #[serde(default = "default_batch_size")]
    #[builder(default = default_batch_size())]
    pub batch_size: usize,
}

impl fmt::Debug for OdbcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdbcConfig")
            .field("connection_string", &"<redacted>")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Analytical store receiving the aggregate mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum AnalyticalStoreConfig {
    /// Embedded append-only store, lives as long as the process
    #[default]
    #[serde(alias = "in_memory", alias = "Memory")]
    Memory,
    /// ClickHouse server reached over its HTTP interface
    #[serde(alias = "ClickHouse")]
    Clickhouse(ClickHouseConfig),
}

/// ClickHouse HTTP connection settings
///
/// # Examples
///
/// ```
/// use sluice_schemas::ClickHouseConfig;
///
/// let config = ClickHouseConfig::builder()
///     .url("http://localhost:8123".try_into().unwrap())
///     .build();
///
/// assert_eq!(config.database, "default");
/// assert_eq!(config.username, "default");
/// ```
#[derive(Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct ClickHouseConfig {
    /// Base URL of the HTTP interface, e.g. `http://localhost:8123`
    #[cfg_attr(feature = "schema_gen", schemars(with = "String"))]
    pub url: url::Url,

    /// Database holding the mirror table
    #[serde(default = "default_clickhouse_database")]
    #[builder(default = default_clickhouse_database())]
    pub database: String,

    /// User name sent as `X-ClickHouse-User`
    #[serde(default = "default_clickhouse_user", alias = "user")]
    #[builder(default = default_clickhouse_user())]
    pub username: String,

    /// Password sent as `X-ClickHouse-Key`
    #[serde(default)]
    #[builder(default)]
    pub password: String,

    /// Per-request timeout in seconds, unbounded when not set
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl fmt::Debug for ClickHouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseConfig")
            .field("url", &self.url.as_str())
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
