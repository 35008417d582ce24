//! Error Handling
//!
//! Application-level error type for everything outside the per-channel
//! delivery path (config loading, state directories, CLI helpers).
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::storage::credentials::DecryptionError;
use crate::storage::lock::LockError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential encryption/decryption errors
    #[error("Credential error: {0}")]
    Crypto(#[from] DecryptionError),

    /// Advisory lock errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] notify_relay_core::ValidationError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<notify_relay_core::CoreError> for AppError {
    fn from(err: notify_relay_core::CoreError) -> Self {
        Self::Config(err.to_string())
    }
}
