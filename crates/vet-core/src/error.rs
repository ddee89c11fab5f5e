//! Error types for vet operations.
//!
//! Review actions and marker parsing never fail with an error: unknown ids
//! and malformed text degrade to no-ops or validator findings. `VetError`
//! covers the genuine failures left over: I/O, JSON, and the host editor.

use std::io;

use thiserror::Error;

/// All possible vet errors.
#[derive(Debug, Error)]
pub enum VetError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The host editor could not read or write a document.
    #[error("host error for {path}: {message}")]
    Host { path: String, message: String },
    /// Could not acquire the blob store lock within the timeout.
    #[error("could not acquire store lock within timeout")]
    LockTimeout,
    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Generic error with a message.
    #[error("{0}")]
    Other(String),
}

impl VetError {
    /// Build a host error for `path`.
    pub fn host(path: impl Into<String>, message: impl Into<String>) -> Self {
        VetError::Host {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias for Results in vet.
pub type VetResult<T> = Result<T, VetError>;
