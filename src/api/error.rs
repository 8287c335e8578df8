//! HTTP-facing errors
//!
//! Every handler failure ends up here and becomes a status code plus a
//! `{ok: false, message}` body (plain text for the stream endpoint).

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::protocol::MessageResponse;
use super::range::RangeError;
use crate::telegram::PlatformError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad or missing input
    #[error("{0}")]
    Validation(String),

    /// The server itself is missing configuration
    #[error("{0}")]
    Configuration(String),

    /// The platform rejected the request
    #[error("API Error: {0}")]
    Upstream(String),

    /// Talking to the platform failed
    #[error("Network Error: {0}")]
    Network(String),

    #[error("Rate limited by the platform, retry after {} seconds", .0.as_secs())]
    RateLimited(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Upstream(_) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(_) | ApiError::Network(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message shown to the user by the upload page
    pub fn message(&self) -> String {
        format!("❌ {}", self)
    }

    fn retry_after(&self) -> Option<HeaderValue> {
        match self {
            ApiError::RateLimited(wait) => Some(HeaderValue::from(wait.as_secs())),
            _ => None,
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        match err {
            // The platform itself failed, not the request
            PlatformError::Api { code, description } if code >= 500 => {
                ApiError::Network(description)
            }
            PlatformError::Api { description, .. } => ApiError::Upstream(description),
            PlatformError::NotAvailable(reason) => ApiError::Upstream(reason),
            PlatformError::RateLimited(wait) => ApiError::RateLimited(wait),
            PlatformError::MissingCredential => {
                ApiError::Configuration("Server BOT_TOKEN not configured.".to_string())
            }
            other @ (PlatformError::Network(_)
            | PlatformError::Timeout
            | PlatformError::Decode(_)) => ApiError::Network(other.to_string()),
        }
    }
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after();
        let body = MessageResponse {
            ok: false,
            message: self.message(),
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(retry) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, retry);
        }
        response
    }
}

/// Plain-text rendering for endpoints that serve binary bodies
#[derive(Debug)]
pub struct PlainText(pub ApiError);

impl From<ApiError> for PlainText {
    fn from(err: ApiError) -> Self {
        PlainText(err)
    }
}

impl IntoResponse for PlainText {
    fn into_response(self) -> Response {
        let retry_after = self.0.retry_after();
        let mut response = (self.0.status(), self.0.to_string()).into_response();
        if let Some(retry) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, retry);
        }
        response
    }
}
