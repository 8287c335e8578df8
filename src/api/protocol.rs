//! JSON bodies exchanged with the upload page

use serde::{Deserialize, Serialize};

use crate::cache::FileRefStats;
use crate::telegram::{ErrorEntry, FileMetadata};

/// `{ok, message}` reply of the upload endpoint and of every JSON error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}

/// One entry of the recent-files listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFile {
    #[serde(flatten)]
    pub metadata: FileMetadata,
    /// Ready-made stream link when the public base URL is known and the
    /// platform will serve the file back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

impl RecentFile {
    pub fn new(metadata: FileMetadata, base_url: Option<&str>) -> Self {
        let stream_url = base_url
            .filter(|_| metadata.is_downloadable())
            .map(|base| stream_url(base, &metadata));
        Self {
            metadata,
            stream_url,
        }
    }
}

/// Link to the stream endpoint carrying everything it needs in the query
pub fn stream_url(base_url: &str, metadata: &FileMetadata) -> String {
    format!(
        "{}/api/stream?file_id={}&name={}&size={}&mime={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&metadata.remote_id),
        urlencoding::encode(&metadata.name),
        metadata.size_bytes,
        urlencoding::encode(&metadata.mime_type),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFilesResponse {
    pub ok: bool,
    pub files: Vec<RecentFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub health: &'static str,
    pub listener_running: bool,
    pub cached_files: usize,
    pub cache_capacity: usize,
    pub file_refs: FileRefStats,
    pub recent_errors: Vec<ErrorEntry>,
}
