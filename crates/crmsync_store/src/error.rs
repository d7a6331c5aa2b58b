//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A table or column name cannot be used as an SQL identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A persisted catalog row could not be decoded.
    #[error("corrupt catalog row in {table}: {message}")]
    CorruptCatalog {
        /// The catalog table.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// A transactional step failed and was rolled back.
    #[error("transaction on {table} rolled back: {source}")]
    RolledBack {
        /// The table the transaction was working on.
        table: String,
        /// The error that caused the rollback.
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// Creates a corrupt catalog error.
    pub fn corrupt_catalog(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptCatalog {
            table: table.into(),
            message: message.into(),
        }
    }
}
