use thiserror::Error;

pub type Result<T> = core::result::Result<T, OdbcError>;

/// Error types for ODBC operations with security-conscious error messages.
///
/// IMPORTANT: This type never includes connection strings or other sensitive
/// information in error messages to prevent password leakage.
#[derive(Error, Debug)]
pub enum OdbcError {
    #[error("'{0}' is not a valid table identifier")]
    InvalidIdentifier(String),

    #[error("column '{column}' has type {data_type} which has no SQL mapping")]
    UnsupportedType { column: String, data_type: String },

    #[error("statement did not produce a result set")]
    NoResultSet,

    #[error("connection has already been closed")]
    Closed,

    #[error(transparent)]
    ArrowOdbc(#[from] arrow_odbc::Error),

    #[error(transparent)]
    Writer(#[from] arrow_odbc::WriterError),

    #[error(transparent)]
    OdbcApi(#[from] arrow_odbc::odbc_api::Error),

    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
}

impl OdbcError {
    /// True when the driver reports a connection exception (SQLSTATE class `08`)
    /// or the connection was already released
    pub fn is_connection_failure(&self) -> bool {
        match self {
            OdbcError::Closed => true,
            OdbcError::OdbcApi(arrow_odbc::odbc_api::Error::Diagnostics { record, .. }) => {
                record.state.as_str().starts_with("08")
            }
            _ => false,
        }
    }
}
