//! # Sluice ODBC
//!
//! Relational store access through [arrow-odbc](https://docs.rs/arrow-odbc).
//! Result sets are read as Arrow record batches and tables are replaced through
//! a staging table that is swapped in within a single transaction.
//!
//! ```rust,ignore
//! use sluice_odbc::OdbcConnection;
//!
//! let connection_string: &str = "\
//!     Driver={PostgreSQL Unicode};\
//!     Server=localhost;\
//!     UID=postgres;\
//!     PWD=postgres;\
//! ";
//!
//! let connection = OdbcConnection::connect(connection_string, 1000)?;
//! let batches = connection.query("SELECT * FROM aggregated_sales_data")?;
//! ```

mod connection;
pub mod ddl;
pub mod error;

pub use connection::OdbcConnection;
pub use error::{OdbcError, Result};
