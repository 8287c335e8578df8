//! Bot API types and FileMetadata extraction
//!
//! Defines the subset of Telegram Bot API objects the relay reads, and the
//! conversion from a media message to the relay's [`FileMetadata`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest file `getFile` hands out a download path for (20 MB)
pub const MAX_DOWNLOAD_SIZE: u64 = 20 * 1024 * 1024;

/// Envelope wrapping every Bot API reply
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<u16>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

/// Extra hints attached to failed calls
#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before repeating the request (flood control)
    #[serde(default)]
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn retry_after(&self) -> Option<u64> {
        self.parameters.as_ref().and_then(|p| p.retry_after)
    }
}

/// Result of `getFile`
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_unique_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Download path, valid for at least one hour
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Result of `getMe`
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl Chat {
    /// Match against a configured target, either a numeric id or `@username`
    pub fn matches(&self, target: &str) -> bool {
        let target = target.trim();
        if let Some(name) = target.strip_prefix('@') {
            return self
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(name));
        }
        target.parse::<i64>().is_ok_and(|id| id == self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// One resolution of a photo; `photo` messages carry several
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Shared shape of `video`, `audio`, `voice` and `animation`
#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    /// Unix time the message was sent
    pub date: i64,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub video: Option<Media>,
    #[serde(default)]
    pub audio: Option<Media>,
    #[serde(default)]
    pub voice: Option<Media>,
    #[serde(default)]
    pub animation: Option<Media>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref().or(self.channel_post.as_ref())
    }
}

/// Metadata of a file the platform holds, as listed to browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "file_name")]
    pub name: String,
    /// Opaque handle into the platform
    #[serde(rename = "file_id")]
    pub remote_id: String,
    #[serde(rename = "file_size")]
    pub size_bytes: u64,
    pub mime_type: String,
}

impl FileMetadata {
    pub fn new(
        name: impl Into<String>,
        remote_id: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            remote_id: remote_id.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Whether the Bot API will serve this file back; unknown sizes are tried
    pub fn is_downloadable(&self) -> bool {
        self.size_bytes <= MAX_DOWNLOAD_SIZE
    }
}

impl Message {
    /// Send time as a timestamp, `None` if out of range
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }

    /// Extract the metadata of the media this message carries, if any
    ///
    /// For photos the largest resolution is used. Media without a file name
    /// get one derived from the unique id.
    pub fn file_metadata(&self) -> Option<FileMetadata> {
        if let Some(doc) = &self.document {
            return Some(FileMetadata::new(
                doc.file_name.clone().unwrap_or_else(|| "document".to_string()),
                &doc.file_id,
                doc.file_size.unwrap_or(0),
                doc.mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            ));
        }

        let largest_photo = self.photo.as_deref().and_then(|sizes| {
            sizes
                .iter()
                .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size))
        });
        if let Some(largest) = largest_photo {
            return Some(FileMetadata::new(
                format!("photo_{}.jpg", largest.file_unique_id),
                &largest.file_id,
                largest.file_size.unwrap_or(0),
                "image/jpeg",
            ));
        }

        let kinds = [
            (&self.video, "video", "mp4", "video/mp4"),
            (&self.animation, "animation", "mp4", "video/mp4"),
            (&self.audio, "audio", "mp3", "audio/mpeg"),
            (&self.voice, "voice", "ogg", "audio/ogg"),
        ];
        kinds.into_iter().find_map(|(media, kind, ext, default_mime)| {
            media.as_ref().map(|m| {
                FileMetadata::new(
                    m.file_name
                        .clone()
                        .unwrap_or_else(|| format!("{kind}_{}.{ext}", m.file_unique_id)),
                    &m.file_id,
                    m.file_size.unwrap_or(0),
                    m.mime_type.clone().unwrap_or_else(|| default_mime.to_string()),
                )
            })
        })
    }
}
