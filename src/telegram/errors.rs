//! Bot API Error Types
//!
//! Structured error handling for Telegram Bot API operations.
//! Maps HTTP status codes and API error replies to specific variants so the
//! HTTP layer can pick a status code and the listener can pick a backoff.

use std::time::Duration;

/// Bot API error types
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform answered with `ok: false`
    #[error("{description}")]
    Api { code: u16, description: String },

    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    Decode(String),

    /// The platform accepted the call but cannot serve the file
    #[error("File not available: {0}")]
    NotAvailable(String),

    #[error("Bot token not configured")]
    MissingCredential,
}

impl PlatformError {
    /// Whether the same call may succeed later without any change
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::RateLimited(_)
            | PlatformError::Timeout
            | PlatformError::Network(_)
            | PlatformError::Decode(_) => true,
            PlatformError::Api { code, .. } => *code >= 500,
            PlatformError::NotAvailable(_) | PlatformError::MissingCredential => false,
        }
    }

    /// Create a PlatformError from an HTTP status, the API description and
    /// the optional `retry_after` hint
    pub fn from_status(status: u16, description: &str, retry_after: Option<u64>) -> Self {
        match status {
            429 => PlatformError::RateLimited(Duration::from_secs(retry_after.unwrap_or(1))),
            408 => PlatformError::Timeout,
            _ => PlatformError::Api {
                code: status,
                description: description.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs embed the bot token
        let err = err.without_url();
        if err.is_timeout() {
            PlatformError::Timeout
        } else if err.is_decode() {
            PlatformError::Decode(err.to_string())
        } else {
            PlatformError::Network(err.to_string())
        }
    }
}
