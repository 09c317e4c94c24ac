use thiserror::Error;

pub type Result<T> = core::result::Result<T, ClickHouseError>;

/// Server error codes raised when inserted data does not fit the table definition
const SCHEMA_ERROR_CODES: &[u32] = &[
    6,   // CANNOT_PARSE_TEXT
    16,  // NO_SUCH_COLUMN_IN_TABLE
    20,  // NUMBER_OF_COLUMNS_DOESNT_MATCH
    27,  // CANNOT_PARSE_INPUT_ASSERTION_FAILED
    38,  // CANNOT_PARSE_DATE
    53,  // TYPE_MISMATCH
    69,  // ARGUMENT_OUT_OF_BOUND
    70,  // CANNOT_CONVERT_TYPE
    72,  // CANNOT_PARSE_NUMBER
    117, // INCORRECT_DATA
];

const UNKNOWN_TABLE: u32 = 60;

/// Errors raised by the ClickHouse HTTP client.
///
/// Credentials are sent as headers and never end up in these messages.
#[derive(Error, Debug)]
pub enum ClickHouseError {
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("column '{0}' is not present in the batch")]
    MissingColumn(String),

    #[error("ClickHouse request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ClickHouse responded with status {status} (code {code:?}): {message}")]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    /// The insert body was sent but no answer arrived, rows may or may not be stored
    #[error("outcome of inserting {rows} rows is unknown: {source}")]
    InsertOutcomeUnknown {
        rows: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid ClickHouse URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
}

impl ClickHouseError {
    /// The server could not be reached or is refusing work
    pub fn is_connection_failure(&self) -> bool {
        match self {
            ClickHouseError::Transport(err) => {
                err.is_connect() || err.is_timeout() || err.is_request()
            }
            ClickHouseError::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// The server rejected rows because they do not match the table definition
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            ClickHouseError::Server {
                code: Some(code), ..
            } => SCHEMA_ERROR_CODES.contains(code),
            ClickHouseError::MissingColumn(_) => true,
            _ => false,
        }
    }

    /// An insert may have been applied although the request failed
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, ClickHouseError::InsertOutcomeUnknown { .. })
    }

    /// The target table does not exist
    pub fn is_unknown_table(&self) -> bool {
        matches!(
            self,
            ClickHouseError::Server {
                code: Some(UNKNOWN_TABLE),
                ..
            }
        )
    }
}
