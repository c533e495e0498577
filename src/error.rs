// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout the hostrelay library
pub type Result<T> = std::result::Result<T, RelayError>;

/// Custom Error type for the hostrelay library
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Retry error: {context} failed after {attempts} attempts: {reason}")]
    Retry {
        context: String,
        attempts: usize,
        reason: String,
    },
}

impl RelayError {
    /// Build a retry error from the last failure of an operation
    pub fn retry(context: &str, attempts: usize, err: impl std::fmt::Display) -> Self {
        RelayError::Retry {
            context: context.to_string(),
            attempts,
            reason: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}
