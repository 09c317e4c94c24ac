//! Row generator configuration.

use crate::serde_helpers::{
    default_lookback_days, default_max_customer_id, default_max_price, default_max_product_id,
    default_max_quantity, default_min_price, default_num_records, default_regions,
};
use bon::Builder;
use serde::{Deserialize, Serialize};

/// Shape of the synthetic sales batch.
///
/// Every numeric range is inclusive and starts at 1 unless stated otherwise.
///
/// # Examples
///
/// ```
/// use sluice_schemas::GeneratorConfig;
///
/// let config = GeneratorConfig::builder().num_records(10).seed(7).build();
/// assert_eq!(config.regions.len(), 4);
/// assert_eq!(config.min_price, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct GeneratorConfig {
    /// Number of rows to produce
    #[serde(default = "default_num_records")]
    #[builder(default = default_num_records())]
    pub num_records: usize,

    /// Seed for reproducible batches
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_max_customer_id")]
    #[builder(default = default_max_customer_id())]
    pub max_customer_id: i32,

    #[serde(default = "default_max_product_id")]
    #[builder(default = default_max_product_id())]
    pub max_product_id: i32,

    #[serde(default = "default_max_quantity")]
    #[builder(default = default_max_quantity())]
    pub max_quantity: i32,

    #[serde(default = "default_min_price")]
    #[builder(default = default_min_price())]
    pub min_price: i32,

    #[serde(default = "default_max_price")]
    #[builder(default = default_max_price())]
    pub max_price: i32,

    /// Sale dates fall within this many days before today
    #[serde(default = "default_lookback_days")]
    #[builder(default = default_lookback_days())]
    pub lookback_days: i64,

    /// Region names drawn uniformly
    #[serde(default = "default_regions")]
    #[builder(default = default_regions())]
    pub regions: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
