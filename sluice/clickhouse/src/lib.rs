//! # Sluice ClickHouse
//!
//! A small client for the ClickHouse [HTTP interface](https://clickhouse.com/docs/en/interfaces/http).
//! DDL is sent as the request body, bulk inserts stream Arrow record batches
//! as `JSONEachRow`.

mod client;
pub mod error;

pub use client::{json_each_row_body, parse_exception_code, validate_identifier, ClickHouseClient};
pub use error::{ClickHouseError, Result};
