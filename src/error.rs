use std::time::Duration;
use thiserror::Error;

/// Errors that escape the repair loop.
///
/// Content defects in generated output are never reported through this type;
/// they are collected as [`ValidationIssue`](crate::issue::ValidationIssue)s.
/// Only the provider boundary and programmer errors end up here.
#[derive(Error, Debug)]
pub enum RepairError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON encoding or decoding failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A schema contract was declared incorrectly.
    #[error("invalid contract '{contract}': {reason}")]
    InvalidContract {
        contract: &'static str,
        reason: String,
    },

    /// A service request failed its input checks; no generation call was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration detected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for RepairError {
    fn from(err: anyhow::Error) -> Self {
        RepairError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RepairError>;
