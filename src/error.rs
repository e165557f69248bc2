//! Error types for the Floodgate service.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Malformed policies or settings. Only raised during startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter storage errors
    #[error("Storage unavailable: {0}")]
    Storage(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a counter store operation.
///
/// These never reach the caller of the protected service: the limiter
/// converts them into a fail-open decision.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend did not answer within the configured bound
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected or failed the operation
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
