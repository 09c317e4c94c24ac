use std::{fmt, time::Duration};

use datafusion::arrow::error::ArrowError;

use crate::templating::TemplateError;

pub type Result<T> = core::result::Result<T, Error>;

/// Boxed store driver error
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which of the two stores an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Relational,
    Analytical,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational"),
            StoreKind::Analytical => write!(f, "analytical"),
        }
    }
}

/// A raw field that could not be converted to its destination type.
///
/// `record` is the 1-based position of the data record in the input file,
/// not counting the header line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot cast {field} value '{value}' of record {record}: {reason}")]
pub struct CastError {
    pub record: usize,
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl CastError {
    pub fn new(
        record: usize,
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            record,
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cast(#[from] CastError),

    #[error("{store} store unavailable: {source}")]
    StoreUnavailable {
        store: StoreKind,
        #[source]
        source: BoxError,
    },

    #[error("precursor missing: {0}")]
    PrecursorMissing(String),

    #[error("schema mismatch on '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    #[error("partial replication into '{table}': {written} of {expected} rows written ({reason})")]
    PartialReplication {
        table: String,
        expected: u64,
        written: u64,
        reason: String,
    },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("{store} store rejected statement: {source}")]
    Statement {
        store: StoreKind,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("stage '{stage}' timed out after {timeout:?}")]
    Timeout { stage: String, timeout: Duration },

    #[error("run cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    #[error(transparent)]
    Template(Box<TemplateError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl From<TemplateError> for Error {
    fn from(error: TemplateError) -> Self {
        Error::Template(Box::new(error))
    }
}

impl Error {
    pub(crate) fn unavailable(store: StoreKind, source: impl Into<BoxError>) -> Self {
        Error::StoreUnavailable {
            store,
            source: source.into(),
        }
    }

    pub(crate) fn statement(store: StoreKind, source: impl Into<BoxError>) -> Self {
        Error::Statement {
            store,
            source: source.into(),
        }
    }

    pub(crate) fn schema_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same stage later may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. } | Error::Timeout { .. } | Error::PartialReplication { .. }
        )
    }
}
