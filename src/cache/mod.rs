//! In-memory caches
//!
//! The recency cache backs the recent-files listing; the file reference
//! cache saves `getFile` round trips while streaming.

pub mod file_refs;
pub mod recent;

pub use file_refs::{FileRefCache, FileRefStats};
pub use recent::{recent_cutoff, RecencyCache};
