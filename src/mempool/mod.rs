//! Staging buffer for writes waiting on the next epoch.
//!
//! Writers append entries; an epoch takes a snapshot, persists it, and then
//! completes the snapshot, which drops exactly the entries the snapshot saw.
//! Entries appended while the epoch was in flight stay behind for the next
//! one.

mod buffer;

pub use buffer::{DedupScope, Snapshot, StagingBuffer};
