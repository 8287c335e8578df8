//! The seam between the relay and the messaging platform.
//!
//! Handlers only ever see [`MessagingPlatform`]; the Bot API client is one
//! implementation, tests use an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

use super::errors::PlatformError;
use super::types::{FileMetadata, Update};

/// One step of a chunked media read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    Data(Bytes),
    /// Flood control; the read is over, retry after the duration
    RateLimited(Duration),
    /// Any other failure; the read is over
    Failed(String),
}

/// Lazy, finite, non-restartable sequence of chunk events
pub type ChunkStream = BoxStream<'static, ChunkEvent>;

/// Where an upload goes and with which credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub token: String,
    pub chat_id: String,
}

/// How the platform should present an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Photo,
    Document,
}

impl SendKind {
    /// Images go out as photos, everything else as documents
    pub fn for_mime(mime_type: &str) -> Self {
        if mime_type.to_ascii_lowercase().starts_with("image/") {
            SendKind::Photo
        } else {
            SendKind::Document
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            SendKind::Photo => "sendPhoto",
            SendKind::Document => "sendDocument",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            SendKind::Photo => "photo",
            SendKind::Document => "document",
        }
    }
}

/// A file payload received from a browser
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// The platform's acknowledgement of a sent file
#[derive(Debug, Clone, Default)]
pub struct SentFile {
    pub message_id: i64,
    /// Metadata of the stored file, when the reply carried media
    pub metadata: Option<FileMetadata>,
}

/// Resolved download handle of a remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_path: String,
    pub file_size: Option<u64>,
}

/// A recent upstream failure kept for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub timestamp: u64,
    pub operation: String,
    pub error: String,
}

#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    async fn send_file(
        &self,
        target: &UploadTarget,
        upload: FileUpload,
        caption: Option<String>,
        kind: SendKind,
    ) -> Result<SentFile, PlatformError>;

    /// Resolve the download path and authoritative size of a remote file
    async fn resolve_file(&self, remote_id: &str) -> Result<FileRef, PlatformError>;

    /// Read `limit` bytes of a remote file starting at `offset`
    fn stream_media(&self, remote_id: &str, offset: u64, limit: u64) -> ChunkStream;

    async fn get_updates(&self, offset: i64, timeout: Duration)
        -> Result<Vec<Update>, PlatformError>;

    /// "healthy", "degraded" or "unhealthy"
    fn health_status(&self) -> &'static str {
        "healthy"
    }

    fn recent_errors(&self) -> Vec<ErrorEntry> {
        Vec::new()
    }
}
