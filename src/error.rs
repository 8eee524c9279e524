//! Error types for the Scoop service.

use thiserror::Error;

use crate::ratelimit::StoreError;

/// Main error type for Scoop operations.
#[derive(Error, Debug)]
pub enum ScoopError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Flag definition errors
    #[error("Flag definition error: {0}")]
    Flags(String),

    /// Counter store errors
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ScoopError {
    fn from(err: config::ConfigError) -> Self {
        ScoopError::Config(err.to_string())
    }
}

/// Result type alias for Scoop operations.
pub type Result<T> = std::result::Result<T, ScoopError>;
