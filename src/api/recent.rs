//! Recent-files listing served straight from the recency cache

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::debug;

use super::error::ApiError;
use super::protocol::{RecentFile, RecentFilesResponse};
use super::AppState;
use crate::cache::recent_cutoff;

/// `GET /api/get_recent_files`
pub async fn recent_files_handler(
    State(state): State<AppState>,
) -> Result<Json<RecentFilesResponse>, ApiError> {
    if state.settings.chat_id.is_none() {
        return Err(ApiError::Configuration(
            "Server CHAT_ID not configured.".to_string(),
        ));
    }

    let cutoff = recent_cutoff(Utc::now());
    let base_url = state.settings.base_url.as_deref();
    let files: Vec<RecentFile> = state
        .recent
        .recent_since(cutoff)
        .into_iter()
        .map(|entry| RecentFile::new(entry.metadata, base_url))
        .collect();

    debug!(count = files.len(), "Listing recent files");
    Ok(Json(RecentFilesResponse { ok: true, files }))
}
