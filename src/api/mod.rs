//! HTTP API
//!
//! Axum router for the upload page: upload, recent-files listing, ranged
//! streaming and a status report. All handlers share one [`AppState`].

pub mod error;
pub mod protocol;
pub mod range;
pub mod recent;
pub mod status;
pub mod stream;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::cache::{FileRefCache, RecencyCache};
use crate::config::RelaySettings;
use crate::telegram::MessagingPlatform;

/// Largest file the Bot API accepts from a bot
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Room for the multipart framing and text fields around the file
const FORM_OVERHEAD: usize = 64 * 1024;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<dyn MessagingPlatform>,
    pub recent: Arc<RecencyCache>,
    pub file_refs: Arc<FileRefCache>,
    pub settings: Arc<RelaySettings>,
    /// Set while the update listener task is polling
    pub listener_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        recent: Arc<RecencyCache>,
        file_refs: Arc<FileRefCache>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            platform,
            recent,
            file_refs,
            settings: Arc::new(settings),
            listener_running: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Build the complete Axum router with all API routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(upload::upload_handler))
        .route("/api/get_recent_files", get(recent::recent_files_handler))
        .route("/api/stream", get(stream::stream_handler))
        .route("/api/status", get(status::status_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + FORM_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
