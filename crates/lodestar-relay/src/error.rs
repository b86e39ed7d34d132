//! Error types for the relay

use thiserror::Error;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid: {0}")]
    Validation(String),

    #[error("Subscription error: {0}")]
    Subscription(String),
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
