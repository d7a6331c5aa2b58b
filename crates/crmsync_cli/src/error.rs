//! CLI error type.

use crate::config::ConfigError;
use crmsync_engine::SyncError;
use crmsync_store::StoreError;
use thiserror::Error;

/// Errors surfaced by a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store could not be opened or read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Engine failure outside a logged run.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The entity filter matched nothing.
    #[error("no entity '{0}' configured for the selected tenants")]
    UnknownEntity(String),

    /// A tenant worker panicked.
    #[error("worker for tenant '{0}' panicked")]
    WorkerPanicked(String),

    /// Some entity runs ended in error.
    #[error("{0} entity run(s) failed, see the run log")]
    RunsFailed(usize),
}

/// Result alias for commands.
pub type CliResult<T> = Result<T, CliError>;
