//! Error types for remote calls.

use thiserror::Error;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors that can occur while talking to the remote source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a structured error payload.
    #[error("remote error ({method}): {code}: {description}")]
    Api {
        /// The method that was called.
        method: String,
        /// Error code reported by the remote.
        code: String,
        /// Human-readable description.
        description: String,
    },

    /// The response could not be understood.
    #[error("malformed response from {method}: {message}")]
    Malformed {
        /// The method that was called.
        method: String,
        /// What was wrong with the payload.
        message: String,
    },
}

impl RemoteError {
    /// Creates a structured remote error.
    pub fn api(
        method: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Api {
            method: method.into(),
            code: code.into(),
            description: description.into(),
        }
    }

    /// Creates a malformed response error.
    pub fn malformed(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns true if the remote refused the call for exceeding its time budget.
    ///
    /// These are the only failures worth retrying in place.
    pub fn is_time_limit(&self) -> bool {
        let mentions = |text: &str| {
            text.to_lowercase()
                .replace('_', " ")
                .contains("time limit")
        };
        match self {
            RemoteError::Transport(message) => mentions(message),
            RemoteError::Api {
                code, description, ..
            } => mentions(code) || mentions(description),
            RemoteError::Malformed { .. } => false,
        }
    }
}
