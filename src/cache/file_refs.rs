//! File Reference Cache
//!
//! Caches `file_id -> download path` resolutions using Moka so seeking
//! through a video does not cost a `getFile` round trip per range request.
//! The platform keeps download paths valid for at least one hour.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::telegram::FileRef;

/// TTL kept under the platform's one-hour path validity
pub const FILE_REF_TTL: Duration = Duration::from_secs(55 * 60);

/// Upper bound on remembered handles
const MAX_FILE_REFS: u64 = 10_000;

/// Hit/miss counters reported by the status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FileRefStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct FileRefCache {
    refs: Cache<String, FileRef>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileRefCache {
    pub fn new() -> Self {
        Self::with_ttl(FILE_REF_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let refs = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(MAX_FILE_REFS)
            .name("file_ref_cache")
            .build();

        Self {
            refs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a resolved handle, updating hit/miss counters
    pub fn get(&self, remote_id: &str) -> Option<FileRef> {
        match self.refs.get(remote_id) {
            Some(file_ref) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = remote_id, "Cache HIT for file reference");
                Some(file_ref)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = remote_id, "Cache MISS for file reference");
                None
            }
        }
    }

    pub fn insert(&self, remote_id: &str, file_ref: FileRef) {
        self.refs.insert(remote_id.to_string(), file_ref);
        debug!(file_id = remote_id, "Cached file reference");
    }

    /// Forget a handle whose download path stopped working
    pub fn invalidate(&self, remote_id: &str) {
        self.refs.invalidate(remote_id);
        debug!(file_id = remote_id, "Invalidated file reference");
    }

    pub fn stats(&self) -> FileRefStats {
        FileRefStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for FileRefCache {
    fn default() -> Self {
        Self::new()
    }
}
