//! Error types for the sync engine.

use crmsync_remote::RemoteError;
use crmsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote source failed or reported an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote and local record counts disagree after a pass.
    #[error("integrity divergence: remote={remote}, local={local}")]
    IntegrityDivergence {
        /// Records reported by the remote source.
        remote: u64,
        /// Rows in the physical table.
        local: u64,
    },

    /// The physical schema is not in the state the catalog expects.
    #[error("schema conflict on {table}.{column}: {message}")]
    SchemaConflict {
        /// Physical table.
        table: String,
        /// Physical column.
        column: String,
        /// What was unexpected.
        message: String,
    },

    /// The deletion-reconciliation transaction failed and was rolled back.
    #[error("reconciliation of {table} failed: {source}")]
    Reconciliation {
        /// Physical table.
        table: String,
        /// The store failure.
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Creates a schema conflict error.
    pub fn schema_conflict(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaConflict {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried in place.
    ///
    /// Only time-limit refusals from the remote qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_time_limit(),
            _ => false,
        }
    }

    /// Absolute count difference, for divergence errors.
    pub fn divergence(&self) -> Option<u64> {
        match self {
            SyncError::IntegrityDivergence { remote, local } => Some(remote.abs_diff(*local)),
            _ => None,
        }
    }
}
