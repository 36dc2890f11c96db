//! Error types for the Inkwell service.

use thiserror::Error;

/// Main error type for Inkwell startup and configuration.
#[derive(Error, Debug)]
pub enum InkwellError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for InkwellError {
    fn from(err: config::ConfigError) -> Self {
        InkwellError::Config(err.to_string())
    }
}

/// Result type alias for Inkwell operations.
pub type Result<T> = std::result::Result<T, InkwellError>;
