use std::fmt;
use thiserror::Error;

/// Boxed error returned by batch executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which side of a field mapping an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{side} field '{field}' does not exist in table '{table}'")]
    FieldNotFound {
        side: Side,
        table: String,
        field: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    /// A batch was rejected by the store and rolled back.
    #[error("batch {batch_index} ({batch_size} records) failed and was rolled back: {source}")]
    Execution {
        batch_index: usize,
        batch_size: usize,
        /// Records committed by earlier batches of the same run.
        migrated_before: usize,
        #[source]
        source: BoxError,
    },

    #[error("type mismatch for column '{table}.{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    #[error("failed to read column '{table}.{column}' as {expected}: {message}")]
    ColumnRead {
        table: String,
        column: String,
        expected: String,
        message: String,
    },

    #[error(transparent)]
    Schema(#[from] resync_schema::SchemaError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl Error {
    /// Returns true for the "referenced field does not exist" kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FieldNotFound { .. })
    }
}
