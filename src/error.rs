//! Common error types for the image generation client

use std::time::Duration;

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Missing credentials or invalid configuration. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient transport-level failure: 5xx, 429, connect failure,
    /// request timeout. Retryable within a single node.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-retryable API failure, including malformed bodies and
    /// responses that carry no image.
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    /// An asynchronous generation task did not reach a terminal state
    /// within the polling bound.
    #[error("Task {task_id} timed out after {elapsed:?}")]
    TaskTimeout { task_id: String, elapsed: Duration },

    /// The caller cancelled the request. Terminal for the whole
    /// operation: never retried, never triggers the next node.
    #[error("Request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether the retry executor may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// Convenience constructor for non-retryable API failures.
    pub fn api(message: impl Into<String>, status: Option<u16>) -> Self {
        ClientError::Api {
            message: message.into(),
            status,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ClientError>;
