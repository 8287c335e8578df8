//! Telegram Bot API Client
//!
//! Sends files to chats, resolves and range-downloads stored files, and
//! long-polls updates for the recent-files listener.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::RANGE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::PlatformError;
use super::platform::{
    ChunkEvent, ChunkStream, ErrorEntry, FileRef, FileUpload, MessagingPlatform, SendKind,
    SentFile, UploadTarget,
};
use super::types::{ApiResponse, File, Message, Update, User};
use crate::cache::FileRefCache;

/// Public Bot API endpoint
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for metadata calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a whole file upload
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Slack on top of the long-poll timeout before the request is abandoned
const POLL_MARGIN: Duration = Duration::from_secs(10);

/// Maximum number of recent errors to track
const MAX_ERROR_HISTORY: usize = 10;

/// Health status values
pub const HEALTH_HEALTHY: u8 = 0;
pub const HEALTH_DEGRADED: u8 = 1;
pub const HEALTH_UNHEALTHY: u8 = 2;

const ALLOWED_UPDATES: &[&str] = &["message", "channel_post"];

/// Bot API client shared by every request handler and the listener
#[derive(Clone)]
pub struct BotClient {
    http_client: Client,
    /// Base URL without trailing slash
    api_url: String,
    /// Server credential; uploads may bring their own
    token: Option<String>,
    file_refs: Arc<FileRefCache>,
    /// Connection health (0=healthy, 1=degraded, 2=unhealthy)
    health: Arc<AtomicU8>,
    /// Recent error log
    error_log: Arc<RwLock<VecDeque<ErrorEntry>>>,
}

#[derive(Debug, Serialize)]
struct GetFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

impl BotClient {
    /// Create a client against `api_url`
    ///
    /// No request is made; use [`BotClient::get_me`] to verify the token.
    pub fn new(api_url: &str, token: Option<String>, file_refs: Arc<FileRefCache>) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            file_refs,
            health: Arc::new(AtomicU8::new(HEALTH_HEALTHY)),
            error_log: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_ERROR_HISTORY))),
        })
    }

    pub fn file_refs(&self) -> &Arc<FileRefCache> {
        &self.file_refs
    }

    fn token(&self) -> Result<&str, PlatformError> {
        self.token.as_deref().ok_or(PlatformError::MissingCredential)
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, token, method)
    }

    fn file_url(&self, token: &str, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, token, file_path)
    }

    /// Fetch the bot's own account, validating the server token
    pub async fn get_me(&self) -> Result<User, PlatformError> {
        let token = self.token()?;
        let request = self
            .http_client
            .get(self.method_url(token, "getMe"))
            .timeout(REQUEST_TIMEOUT);
        self.execute("getMe", request).await
    }

    /// Send a request and unwrap the Bot API envelope, tracking health
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, PlatformError> {
        let outcome = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            decode_reply(status, &body)
        }
        .await;

        match &outcome {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(operation, e),
        }
        outcome
    }

    fn record_success(&self) {
        self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);
    }

    fn record_failure(&self, operation: &str, err: &PlatformError) {
        match err {
            PlatformError::Network(_) | PlatformError::Timeout => {
                self.health.store(HEALTH_UNHEALTHY, Ordering::Relaxed)
            }
            PlatformError::RateLimited(_) => self.health.store(HEALTH_DEGRADED, Ordering::Relaxed),
            _ => {}
        }
        warn!(operation = operation, error = %err, "Bot API call failed");
        self.log_error(operation, &err.to_string());
    }

    /// Log an error to the error history ring buffer
    fn log_error(&self, operation: &str, error: &str) {
        let entry = ErrorEntry {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            operation: operation.to_string(),
            error: error.to_string(),
        };

        let mut log = self
            .error_log
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if log.len() >= MAX_ERROR_HISTORY {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Open the download of `limit` bytes at `offset`
    async fn open_media(
        &self,
        remote_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ChunkStream, PlatformError> {
        if limit == 0 {
            return Ok(stream::empty().boxed());
        }

        let file_ref = self.resolve_file(remote_id).await?;
        let token = self.token()?;
        let end = offset + limit - 1;

        debug!(file_id = remote_id, start = offset, end = end, "Opening ranged download");

        let response = match self
            .http_client
            .get(self.file_url(token, &file_ref.file_path))
            .header(RANGE, format!("bytes={}-{}", offset, end))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = PlatformError::from(e);
                self.record_failure("download", &err);
                return Err(err);
            }
        };

        let status = response.status();
        let skip = match status {
            StatusCode::PARTIAL_CONTENT => 0,
            // Range ignored, the body starts at byte 0
            StatusCode::OK => offset,
            _ => {
                let body = response.text().await.unwrap_or_default();
                if status == StatusCode::NOT_FOUND {
                    self.file_refs.invalidate(remote_id);
                }
                let err = decode_reply::<serde_json::Value>(status, &body)
                    .err()
                    .unwrap_or_else(|| {
                        PlatformError::from_status(
                            status.as_u16(),
                            "Unexpected download reply",
                            None,
                        )
                    });
                self.record_failure("download", &err);
                return Err(err);
            }
        };
        self.record_success();

        if skip > 0 {
            debug!(file_id = remote_id, skip = skip, "Upstream ignored range, windowing locally");
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| match chunk {
                Ok(bytes) => ChunkEvent::Data(bytes),
                Err(e) => ChunkEvent::Failed(PlatformError::from(e).to_string()),
            })
            .boxed();

        Ok(window(chunks, skip, limit))
    }
}

#[async_trait]
impl MessagingPlatform for BotClient {
    async fn send_file(
        &self,
        target: &UploadTarget,
        upload: FileUpload,
        caption: Option<String>,
        kind: SendKind,
    ) -> Result<SentFile, PlatformError> {
        let file_name = upload.file_name.clone();
        let size = upload.data.len();

        let mut form = Form::new().text("chat_id", target.chat_id.clone());
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            form = form.text("caption", caption);
        }
        form = form.part(kind.field(), file_part(upload)?);

        info!(
            file = %file_name,
            size = size,
            chat_id = %target.chat_id,
            method = kind.method(),
            "Sending file to chat"
        );

        let request = self
            .http_client
            .post(self.method_url(&target.token, kind.method()))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form);
        let message: Message = self.execute(kind.method(), request).await?;

        info!(file = %file_name, message_id = message.message_id, "File sent");

        Ok(SentFile {
            message_id: message.message_id,
            metadata: message.file_metadata(),
        })
    }

    async fn resolve_file(&self, remote_id: &str) -> Result<FileRef, PlatformError> {
        if let Some(file_ref) = self.file_refs.get(remote_id) {
            return Ok(file_ref);
        }

        let token = self.token()?;
        let request = self
            .http_client
            .post(self.method_url(token, "getFile"))
            .timeout(REQUEST_TIMEOUT)
            .json(&GetFileRequest { file_id: remote_id });
        let file: File = match self.execute("getFile", request).await {
            Err(PlatformError::Api { description, .. }) if description.contains("too big") => {
                return Err(PlatformError::NotAvailable(
                    "file is too big, Bot API downloads stop at 20 MB".to_string(),
                ));
            }
            other => other?,
        };

        let file_path = file.file_path.ok_or_else(|| {
            PlatformError::NotAvailable(format!("no download path for {}", file.file_unique_id))
        })?;
        let file_ref = FileRef {
            file_path,
            file_size: file.file_size,
        };

        debug!(
            file_id = remote_id,
            path = %file_ref.file_path,
            size = ?file_ref.file_size,
            "Resolved file"
        );
        self.file_refs.insert(remote_id, file_ref.clone());
        Ok(file_ref)
    }

    fn stream_media(&self, remote_id: &str, offset: u64, limit: u64) -> ChunkStream {
        let client = self.clone();
        let remote_id = remote_id.to_string();

        stream::once(async move { client.open_media(&remote_id, offset, limit).await })
            .flat_map(|opened| match opened {
                Ok(chunks) => chunks,
                Err(err) => stream::iter([error_event(err)]).boxed(),
            })
            .boxed()
    }

    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, PlatformError> {
        let token = self.token()?;
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        let request = self
            .http_client
            .post(self.method_url(token, "getUpdates"))
            .timeout(timeout + POLL_MARGIN)
            .json(&request);
        self.execute("getUpdates", request).await
    }

    fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            HEALTH_DEGRADED => "degraded",
            _ => "unhealthy",
        }
    }

    fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.error_log
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Unwrap a Bot API envelope
///
/// Failed calls carry their own `error_code`; bodies that are not an
/// envelope at all fall back to the HTTP status.
fn decode_reply<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, PlatformError> {
    match serde_json::from_str::<ApiResponse<T>>(body) {
        Ok(reply) if reply.ok => reply
            .result
            .ok_or_else(|| PlatformError::Decode("reply without result".to_string())),
        Ok(reply) => Err(PlatformError::from_status(
            reply.error_code.unwrap_or(status.as_u16()),
            reply.description.as_deref().unwrap_or("Unknown"),
            reply.retry_after(),
        )),
        Err(e) if status.is_success() => Err(PlatformError::Decode(e.to_string())),
        Err(_) => Err(PlatformError::from_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            None,
        )),
    }
}

fn file_part(upload: FileUpload) -> Result<Part, PlatformError> {
    let length = upload.data.len() as u64;
    let part = Part::stream_with_length(Body::from(upload.data.clone()), length)
        .file_name(upload.file_name.clone());

    match part.mime_str(&upload.mime_type) {
        Ok(part) => Ok(part),
        Err(_) => {
            warn!(mime = %upload.mime_type, "Invalid MIME type, sending as octet-stream");
            Ok(Part::stream_with_length(Body::from(upload.data), length)
                .file_name(upload.file_name)
                .mime_str("application/octet-stream")?)
        }
    }
}

fn error_event(err: PlatformError) -> ChunkEvent {
    match err {
        PlatformError::RateLimited(wait) => ChunkEvent::RateLimited(wait),
        other => ChunkEvent::Failed(other.to_string()),
    }
}

/// Restrict a chunk sequence to `take` bytes after skipping `skip`
///
/// A terminal event ends the window.
pub fn window(chunks: ChunkStream, skip: u64, take: u64) -> ChunkStream {
    struct Window {
        chunks: ChunkStream,
        skip: u64,
        remaining: u64,
    }

    let state = Window {
        chunks,
        skip,
        remaining: take,
    };

    stream::unfold(state, |mut w| async move {
        loop {
            if w.remaining == 0 {
                return None;
            }
            match w.chunks.next().await? {
                ChunkEvent::Data(mut bytes) => {
                    let len = bytes.len() as u64;
                    if w.skip >= len {
                        w.skip -= len;
                        continue;
                    }
                    if w.skip > 0 {
                        bytes = bytes.slice(w.skip as usize..);
                        w.skip = 0;
                    }
                    if bytes.len() as u64 > w.remaining {
                        bytes.truncate(w.remaining as usize);
                    }
                    if bytes.is_empty() {
                        continue;
                    }
                    w.remaining -= bytes.len() as u64;
                    return Some((ChunkEvent::Data(bytes), w));
                }
                terminal => {
                    w.remaining = 0;
                    return Some((terminal, w));
                }
            }
        }
    })
    .boxed()
}
