//! In-memory platform and request helpers for handler tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use futures::stream::{self, StreamExt};
use tower::ServiceExt;

use super::{build_router, AppState};
use crate::cache::{FileRefCache, RecencyCache};
use crate::config::RelaySettings;
use crate::telegram::{
    ChunkEvent, ChunkStream, FileMetadata, FileRef, FileUpload, MessagingPlatform, PlatformError,
    SendKind, SentFile, UploadTarget, Update,
};

pub const TOKEN: &str = "123:server-token";
pub const CHAT_ID: &str = "-1001234567890";

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub target: UploadTarget,
    pub file_name: String,
    pub mime_type: String,
    pub size: usize,
    pub caption: Option<String>,
    pub kind: SendKind,
}

/// Scripted stand-in for the Bot API
#[derive(Default)]
pub struct FakePlatform {
    /// Error returned by the next `send_file` instead of succeeding
    pub reject: Mutex<Option<PlatformError>>,
    /// Size reported by `resolve_file`
    pub file_size: Option<u64>,
    /// Events yielded by `stream_media`, in order
    pub script: Vec<ChunkEvent>,
    pub sent: Mutex<Vec<SentRecord>>,
    pub stream_calls: Mutex<Vec<(String, u64, u64)>>,
    /// Number of events pulled out of `script`
    pub pulled: Arc<AtomicUsize>,
}

impl FakePlatform {
    pub fn rejecting(err: PlatformError) -> Self {
        Self {
            reject: Mutex::new(Some(err)),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> Vec<(String, u64, u64)> {
        self.stream_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPlatform for FakePlatform {
    async fn send_file(
        &self,
        target: &UploadTarget,
        upload: FileUpload,
        caption: Option<String>,
        kind: SendKind,
    ) -> Result<SentFile, PlatformError> {
        self.sent.lock().unwrap().push(SentRecord {
            target: target.clone(),
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            size: upload.data.len(),
            caption,
            kind,
        });
        if let Some(err) = self.reject.lock().unwrap().take() {
            return Err(err);
        }
        Ok(SentFile {
            message_id: 1,
            metadata: Some(FileMetadata::new(
                upload.file_name,
                "remote-1",
                upload.data.len() as u64,
                upload.mime_type,
            )),
        })
    }

    async fn resolve_file(&self, _remote_id: &str) -> Result<FileRef, PlatformError> {
        Ok(FileRef {
            file_path: "documents/file_1".to_string(),
            file_size: self.file_size,
        })
    }

    fn stream_media(&self, remote_id: &str, offset: u64, limit: u64) -> ChunkStream {
        self.stream_calls
            .lock()
            .unwrap()
            .push((remote_id.to_string(), offset, limit));
        let pulled = Arc::clone(&self.pulled);
        stream::iter(self.script.clone())
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }

    async fn get_updates(
        &self,
        _offset: i64,
        _timeout: Duration,
    ) -> Result<Vec<Update>, PlatformError> {
        Ok(Vec::new())
    }
}

pub fn settings() -> RelaySettings {
    RelaySettings::new(
        Some(TOKEN.to_string()),
        Some(CHAT_ID.to_string()),
        Some("https://relay.example.com".to_string()),
    )
}

pub fn state_with(platform: Arc<FakePlatform>, settings: RelaySettings) -> AppState {
    AppState::new(
        platform,
        Arc::new(RecencyCache::new()),
        Arc::new(FileRefCache::new()),
        settings,
    )
}

pub fn app(state: AppState) -> Router {
    build_router(state)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers[name].to_str().unwrap()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// One multipart field: name, optional (file name, content type), data
pub type FormField<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

pub fn multipart_request(uri: &str, fields: &[FormField<'_>]) -> Request<Body> {
    const BOUNDARY: &str = "relay-test-boundary";
    let mut body = Vec::new();
    for (name, file, data) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((file_name, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header("range", range);
    }
    builder.body(Body::empty()).unwrap()
}
