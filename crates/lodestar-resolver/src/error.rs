//! Error types for resolution
//!
//! "No usable record" is not an error: resolution returns `Ok(None)` for
//! that. Errors mean the caller could not even ask (transport, timeout),
//! supplied bad input, or hit a corrupted record addressed to them.

use lodestar::{EventError, SealError};
use thiserror::Error;

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event error: {0}")]
    Event(#[from] EventError),

    #[error("decryption error: {0}")]
    Seal(#[from] SealError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("publish rejected: {0}")]
    PublishFailed(String),
}

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;
