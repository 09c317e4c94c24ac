//! Shared serde default value functions.

/// Default value for boolean fields that should be true
pub fn default_true() -> bool {
    true
}

/// Default comma delimiter for CSV files
pub fn default_comma() -> char {
    ','
}

/// Default batch size for ODBC inserts
pub fn default_batch_size() -> usize {
    1000
}

/// Default rows per analytical insert call
pub fn default_chunk_rows() -> usize {
    100_000
}

pub fn default_sales_table() -> String {
    "sales_data".to_string()
}

pub fn default_aggregate_table() -> String {
    "aggregated_sales_data".to_string()
}

pub fn default_mirror_table() -> String {
    "aggregated_sales_data".to_string()
}

pub fn default_clickhouse_database() -> String {
    "default".to_string()
}

pub fn default_clickhouse_user() -> String {
    "default".to_string()
}

pub fn default_num_records() -> usize {
    100_000
}

pub fn default_max_customer_id() -> i32 {
    10_000
}

pub fn default_max_product_id() -> i32 {
    100
}

pub fn default_max_quantity() -> i32 {
    20
}

pub fn default_min_price() -> i32 {
    10
}

pub fn default_max_price() -> i32 {
    1000
}

pub fn default_lookback_days() -> i64 {
    365
}

pub fn default_regions() -> Vec<String> {
    ["North", "South", "East", "West"]
        .into_iter()
        .map(String::from)
        .collect()
}
