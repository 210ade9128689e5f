//! Error types for container runtime access

use std::fmt;

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors reported by a [`RuntimeClient`](super::RuntimeClient)
#[derive(Debug)]
pub enum RuntimeError {
    /// The container, service or task no longer exists
    NotFound(String),

    /// The runtime did not answer in time
    Timeout(String),

    /// The runtime endpoint could not be reached
    Connection(String),

    /// The runtime answered with an error status
    Api { status: u16, message: String },

    /// A response or event could not be decoded
    Decode(String),

    /// Any other transport failure
    Transport(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NotFound(what) => write!(f, "not found: {what}"),
            RuntimeError::Timeout(msg) => write!(f, "runtime request timed out: {msg}"),
            RuntimeError::Connection(msg) => write!(f, "failed to connect to runtime: {msg}"),
            RuntimeError::Api { status, message } => {
                write!(f, "runtime returned status {status}: {message}")
            }
            RuntimeError::Decode(msg) => write!(f, "failed to decode runtime response: {msg}"),
            RuntimeError::Transport(msg) => write!(f, "runtime transport error: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RuntimeError::Timeout(err.to_string())
        } else if err.is_connect() {
            RuntimeError::Connection(err.to_string())
        } else if err.is_decode() {
            RuntimeError::Decode(err.to_string())
        } else {
            RuntimeError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Decode(err.to_string())
    }
}
