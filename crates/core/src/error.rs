//! Core Error Types
//!
//! Defines the foundational error types used across the notify-relay workspace.
//! These error types are dependency-free (only thiserror + std) to keep the core
//! crate lightweight.
//!
//! `ValidationError` messages never echo the rejected value when that value
//! may carry a secret (webhook URLs embed tokens), only what was wrong with it.

use thiserror::Error;

/// Core error type for the notify-relay workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

/// Reasons an input value was rejected by the validators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is empty")]
    Empty,

    #[error("not a plain integer literal")]
    NotNumeric,

    #[error("integer literal is too large")]
    Overflow,

    #[error("{value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: u64, min: u64, max: u64 },

    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("URL scheme must be https")]
    InsecureScheme,

    #[error("URL targets a blocked internal host: {0}")]
    BlockedHost(String),

    #[error("malformed email address")]
    MalformedEmail,

    #[error("path contains forbidden characters: {0}")]
    UnsafePath(String),

    #[error("path does not exist")]
    PathNotFound,

    #[error("malformed bot token")]
    MalformedToken,

    #[error("malformed chat id")]
    MalformedChatId,
}
