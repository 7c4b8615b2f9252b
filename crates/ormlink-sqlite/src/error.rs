//! Error types for the SQLite backend.

use thiserror::Error;
use uuid::Uuid;

/// SQLite backend errors.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Error from SQLite itself.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filter uses something other than equality.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// A value has no column representation.
    #[error("cannot store {found} in `{table}.{column}`")]
    Unstorable {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Offending value.
        found: String,
    },

    /// A column holds something the field type cannot read.
    #[error("column `{table}.{column}` holds {found}, expected {expected}")]
    Column {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared field type.
        expected: String,
        /// Storage class found in the column.
        found: String,
    },

    /// Update of a row that does not exist.
    #[error("row {id} not found in `{table}`")]
    MissingRow {
        /// Table name.
        table: String,
        /// Row identity.
        id: Uuid,
    },
}

/// Result type for SQLite backend operations.
pub type Result<T> = std::result::Result<T, SqliteError>;
