//! Telegram Bot API client and the platform seam the relay is written against

pub mod client;
pub mod errors;
pub mod platform;
pub mod types;

pub use client::BotClient;
pub use errors::PlatformError;
pub use platform::{
    ChunkEvent, ChunkStream, ErrorEntry, FileRef, FileUpload, MessagingPlatform, SendKind,
    SentFile, UploadTarget,
};
pub use types::{FileMetadata, Update, MAX_DOWNLOAD_SIZE};
