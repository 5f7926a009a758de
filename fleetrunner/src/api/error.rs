//! Error types for control-plane communication.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by control-plane calls.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, broken pipe).
    #[error("transport error for {path}: {message}")]
    Transport { path: String, message: String },

    /// Non-success HTTP status from the control plane.
    #[error("HTTP {status} from {path}")]
    Status { status: u16, path: String },

    /// Response body could not be decoded.
    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    /// Request body could not be encoded.
    #[error("failed to encode request body for {path}: {message}")]
    Encode { path: String, message: String },

    /// Bearer token could not be produced.
    #[error("token error: {0}")]
    Token(String),

    /// The owning context was cancelled before the call completed.
    #[error("request cancelled")]
    Cancelled,

    /// The backoff policy gave up; carries the last observed error.
    #[error("retries exhausted after {elapsed:?}: {last}")]
    RetriesExhausted {
        elapsed: Duration,
        last: Box<ApiError>,
    },
}

impl ApiError {
    /// Whether the retry policy may try this call again.
    ///
    /// Transport errors are always retryable. HTTP statuses are retryable
    /// only at 502 and above: a 500/501 is treated as a deterministic
    /// server-side failure that a retry will not fix, while 502/503/504
    /// indicate an unreachable or overloaded peer.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 502,
            _ => false,
        }
    }
}
