use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;

use super::protocol::StatusResponse;
use super::AppState;

/// `GET /api/status`
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ok: true,
        health: state.platform.health_status(),
        listener_running: state.listener_running.load(Ordering::Relaxed),
        cached_files: state.recent.len(),
        cache_capacity: state.recent.capacity(),
        file_refs: state.file_refs.stats(),
        recent_errors: state.platform.recent_errors(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use axum::http::StatusCode;

    use super::super::test_support::{app, get_request, send, settings, state_with, FakePlatform};
    use crate::telegram::{FileMetadata, FileRef};

    #[tokio::test]
    async fn test_status_reports_caches_and_listener() {
        let state = state_with(Arc::new(FakePlatform::default()), settings());
        state
            .recent
            .record(FileMetadata::new("a.txt", "id-a", 1, "text/plain"));
        state.file_refs.insert(
            "id-a",
            FileRef {
                file_path: "documents/file_0".to_string(),
                file_size: Some(1),
            },
        );
        assert!(state.file_refs.get("id-a").is_some());
        assert!(state.file_refs.get("id-b").is_none());
        state.listener_running.store(true, Ordering::Relaxed);

        let response = send(app(state), get_request("/api/status", None)).await;
        assert_eq!(response.status, StatusCode::OK);

        let json = response.json();
        assert_eq!(json["ok"], true);
        assert_eq!(json["health"], "healthy");
        assert_eq!(json["listener_running"], true);
        assert_eq!(json["cached_files"], 1);
        assert_eq!(json["cache_capacity"], 200);
        assert_eq!(json["file_refs"]["hits"], 1);
        assert_eq!(json["file_refs"]["misses"], 1);
        assert_eq!(json["recent_errors"].as_array().unwrap().len(), 0);
    }
}
