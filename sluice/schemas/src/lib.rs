//! # Sluice Schemas
//!
//! This crate contains the configuration types used throughout the sluice workspace.
//! Keeping them here lets the core crate and the store crates (ODBC, ClickHouse)
//! share one definition without depending on each other.

use bon::Builder;
use serde::{Deserialize, Serialize};

pub mod generator;
pub mod location;
pub mod progress;
pub mod stores;

mod serde_helpers;

pub use generator::GeneratorConfig;
pub use location::Location;
pub use progress::ProgressEvent;
pub use stores::{
    AnalyticalStoreConfig, ClickHouseConfig, ClickHouseConfigBuilder, OdbcConfig,
    OdbcConfigBuilder, RelationalStoreConfig,
};

use serde_helpers::{
    default_aggregate_table, default_chunk_rows, default_comma, default_mirror_table,
    default_sales_table, default_true,
};

fn current_version() -> String {
    "v1".to_string()
}

/// Definition of a sales pipeline run.
///
/// A pipeline reads the raw sales file, loads it into the relational store,
/// aggregates it, and mirrors the aggregate into the analytical store.
/// Everything except the input location has a default.
///
/// # Examples
///
/// ```
/// use sluice_schemas::{InputConfig, Pipeline};
///
/// let pipeline = Pipeline::builder()
///     .input(
///         InputConfig::builder()
///             .location("./data.csv".try_into().unwrap())
///             .build(),
///     )
///     .build();
///
/// assert_eq!(pipeline.tables.sales, "sales_data");
/// assert!(pipeline.stage_timeout_secs.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct Pipeline {
    /// Schema version for migration compatibility
    #[serde(default = "current_version")]
    #[builder(default = current_version())]
    pub version: String,

    /// The raw sales file produced by the generator
    pub input: InputConfig,

    /// Store holding `sales_data` and the authoritative aggregate
    #[serde(default)]
    #[builder(default)]
    pub relational: RelationalStoreConfig,

    /// Store holding the append-only aggregate mirror
    #[serde(default)]
    #[builder(default)]
    pub analytical: AnalyticalStoreConfig,

    /// Table names used by the stages
    #[serde(default)]
    #[builder(default)]
    pub tables: TableNames,

    /// Replication tuning
    #[serde(default)]
    #[builder(default)]
    pub replication: ReplicationConfig,

    /// Upper bound for a single stage in seconds, unbounded when not set
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

/// Location and dialect of the raw sales CSV file
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct InputConfig {
    /// Path or `file://` URL of the CSV file
    #[serde(alias = "path")]
    pub location: Location,

    /// Field delimiter
    #[serde(default = "default_comma")]
    #[builder(default = default_comma())]
    pub delimiter: char,

    /// Whether the first line is a header row
    #[serde(default = "default_true")]
    #[builder(default = default_true())]
    pub has_header: bool,
}

/// Names of the tables touched by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct TableNames {
    /// Typed sales table in the relational store
    #[serde(default = "default_sales_table")]
    #[builder(default = default_sales_table())]
    pub sales: String,

    /// Aggregate table in the relational store
    #[serde(default = "default_aggregate_table")]
    #[builder(default = default_aggregate_table())]
    pub aggregate: String,

    /// Mirror table in the analytical store
    #[serde(default = "default_mirror_table")]
    #[builder(default = default_mirror_table())]
    pub mirror: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            sales: default_sales_table(),
            aggregate: default_aggregate_table(),
            mirror: default_mirror_table(),
        }
    }
}

/// Replication settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct ReplicationConfig {
    /// Maximum number of rows handed to one analytical insert call
    #[serde(default = "default_chunk_rows")]
    #[builder(default = default_chunk_rows())]
    pub chunk_rows: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
        }
    }
}
