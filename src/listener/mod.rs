//! Passive update listener
//!
//! Long-polls the Bot API for new messages in the relay chat and records
//! every media file it sees into the recency cache.

pub mod updates;

pub use updates::UpdateListener;
