//! Data-source error types.

use cq_protocol::SchemaError;
use thiserror::Error;

/// Errors raised by a data source. A failed `write_rows` leaves the
/// target table unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("value {value} does not fit {table}.{column} ({expected})")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        value: String,
    },

    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Convenience alias for data-source results.
pub type StoreResult<T> = Result<T, StoreError>;
