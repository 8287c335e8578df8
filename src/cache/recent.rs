//! Recency Cache
//!
//! Fixed-capacity, newest-first buffer of files observed in the relay chat.
//! Inserting past capacity drops the oldest entry; nothing else ever removes
//! or mutates an entry.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::telegram::FileMetadata;

/// Default number of remembered files
pub const RECENT_CAPACITY: usize = 200;

/// How far back a file still counts as recent, in minutes
pub const RECENT_WINDOW_MINUTES: i64 = 30;

/// Oldest observation time still listed at `now`
pub fn recent_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::minutes(RECENT_WINDOW_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub observed_at: DateTime<Utc>,
    pub metadata: FileMetadata,
}

pub struct RecencyCache {
    entries: RwLock<VecDeque<CacheEntry>>,
    capacity: usize,
}

impl RecencyCache {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a file observed now
    pub fn record(&self, metadata: FileMetadata) {
        self.record_at(metadata, Utc::now());
    }

    /// Record a file with an explicit observation time
    ///
    /// The entry goes to the front regardless of `observed_at`; callers are
    /// expected to insert in time order.
    pub fn record_at(&self, metadata: FileMetadata, observed_at: DateTime<Utc>) {
        debug!(file_id = %metadata.remote_id, name = %metadata.name, "Recording recent file");

        let mut entries = self.write();
        entries.push_front(CacheEntry {
            observed_at,
            metadata,
        });
        entries.truncate(self.capacity);
    }

    /// Entries observed at or after `cutoff`, newest first
    ///
    /// Stops at the first entry older than `cutoff`; anything behind it is
    /// not inspected.
    pub fn recent_since(&self, cutoff: DateTime<Utc>) -> Vec<CacheEntry> {
        self.read()
            .iter()
            .take_while(|entry| entry.observed_at >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the deque half-updated.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<CacheEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<CacheEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RecencyCache {
    fn default() -> Self {
        Self::new()
    }
}
