//! Ranged streaming relay
//!
//! Answers `GET /api/stream` with a 206 whose body is pulled chunk by chunk
//! from the platform. Headers are committed before the first chunk arrives,
//! so failures after that point are reported in-band: the body ends with a
//! short sentinel line instead of an error status.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use super::error::{ApiError, PlainText};
use super::range::ByteRange;
use super::AppState;
use crate::config::non_blank;
use crate::telegram::{ChunkEvent, ChunkStream, MAX_DOWNLOAD_SIZE};

/// Appended when the platform asked us to back off mid-stream
pub const RATE_LIMIT_SENTINEL: &str = "Error: FloodWait received, please try again shortly.";

/// Appended when the upstream read failed mid-stream
pub const STREAM_ERROR_SENTINEL: &str = "Error: Could not stream the file.";

/// Files past [`MAX_DOWNLOAD_SIZE`] cannot be fetched through the Bot API
const TOO_BIG_MESSAGE: &str = "File is too big to stream, Bot API downloads stop at 20 MB";

const DEFAULT_NAME: &str = "download";
const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub file_id: Option<String>,
    pub name: Option<String>,
    /// Kept as text; an unparsable size counts as unknown
    pub size: Option<String>,
    pub mime: Option<String>,
}

impl StreamQuery {
    fn size(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The upload page sometimes encodes the MIME type twice
    fn mime(&self) -> String {
        let raw = non_blank(self.mime.clone()).unwrap_or_else(|| DEFAULT_MIME.to_string());
        let decoded = urlencoding::decode(&raw).map(|mime| mime.into_owned());
        decoded.unwrap_or(raw)
    }
}

/// `GET /api/stream?file_id&name&size&mime`
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, PlainText> {
    let Some(file_id) = non_blank(query.file_id.clone()) else {
        return Err(ApiError::Validation("Missing file_id".to_string()).into());
    };
    let name = non_blank(query.name.clone()).unwrap_or_else(|| DEFAULT_NAME.to_string());
    let mime = query.mime();

    let declared_size = query.size();
    if declared_size > MAX_DOWNLOAD_SIZE {
        return Err(ApiError::Validation(TOO_BIG_MESSAGE.to_string()).into());
    }
    let file_ref = state
        .platform
        .resolve_file(&file_id)
        .await
        .map_err(ApiError::from)?;
    let total_size = match file_ref.file_size {
        Some(actual) => {
            if declared_size != 0 && actual != declared_size {
                warn!(
                    file_id = %file_id,
                    declared = declared_size,
                    actual,
                    "Size mismatch, using platform size"
                );
            }
            actual
        }
        None => declared_size,
    };
    if total_size > MAX_DOWNLOAD_SIZE {
        return Err(ApiError::Validation(TOO_BIG_MESSAGE.to_string()).into());
    }

    let range_header = headers
        .get(header::RANGE)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Validation("Range header is not valid text".to_string()))
        })
        .transpose()?;
    let range = ByteRange::parse(range_header, total_size).map_err(ApiError::from)?;

    info!(
        file_id = %file_id,
        name = %name,
        range = %range.content_range(),
        "Streaming file"
    );

    let chunks = state.platform.stream_media(&file_id, range.start, range.len());
    let mut response = Response::new(Body::from_stream(relay_chunks(chunks)));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime).unwrap_or(HeaderValue::from_static(DEFAULT_MIME)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&name))
            .unwrap_or(HeaderValue::from_static("attachment")),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(content_range) = HeaderValue::from_str(&range.content_range()) {
        headers.insert(header::CONTENT_RANGE, content_range);
    }

    Ok(response)
}

/// Turn platform chunk events into body frames
///
/// Data is forwarded untouched. A rate limit waits out the hint and then
/// ends the body with [`RATE_LIMIT_SENTINEL`]; any other failure ends it
/// with [`STREAM_ERROR_SENTINEL`]. The upstream read is dropped as soon as
/// either happens and is never resumed.
pub fn relay_chunks(
    chunks: ChunkStream,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(Some(chunks), |state| async move {
        let mut chunks = state?;
        match chunks.next().await? {
            ChunkEvent::Data(bytes) => Some((Ok(bytes), Some(chunks))),
            ChunkEvent::RateLimited(wait) => {
                drop(chunks);
                warn!(wait_secs = wait.as_secs(), "Flood wait while streaming");
                tokio::time::sleep(wait).await;
                Some((Ok(Bytes::from_static(RATE_LIMIT_SENTINEL.as_bytes())), None))
            }
            ChunkEvent::Failed(reason) => {
                warn!(error = %reason, "Stream aborted");
                Some((Ok(Bytes::from_static(STREAM_ERROR_SENTINEL.as_bytes())), None))
            }
        }
    })
}

/// `Content-Disposition` value for a download named `name`
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if name.is_ascii() && !name.chars().any(|c| c.is_ascii_control()) {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(name)
        )
    }
}
