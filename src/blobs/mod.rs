//! Content-addressed blob storage.
//!
//! Blobs are addressed by the SHA-256 of their bytes. Chunks and directory
//! versions are both stored as blobs, so any store implementing
//! [`BlobStore`] can back a dataset.
//!
//! Implementations:
//! - `MemoryBlobStore`: shared in-process map, for tests and embedding
//! - `FsBlobStore`: sharded directory on local disk (like Git objects)
//! - `FaultyBlobStore`: wrapper that fails on command, for failure tests

mod faulty;
mod memory;
mod storage;

pub use faulty::{FaultStats, FaultyBlobStore};
pub use memory::MemoryBlobStore;
pub use storage::FsBlobStore;

use crate::types::{Hash, StoreFuture};
use std::sync::Arc;

/// Content-addressed blob store (the IPFS-like provider).
///
/// `put` must be idempotent: storing the same bytes twice yields the same
/// hash and leaves a single copy.
pub trait BlobStore: Send + Sync + 'static {
    /// Store bytes, returning their content hash.
    fn put<'a>(&'a self, content: &'a [u8]) -> StoreFuture<'a, Hash>;

    /// Fetch bytes by hash, `None` if absent.
    fn get<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Check whether a blob is present.
    fn contains<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, bool>;
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn put<'a>(&'a self, content: &'a [u8]) -> StoreFuture<'a, Hash> {
        (**self).put(content)
    }

    fn get<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, Option<Vec<u8>>> {
        (**self).get(hash)
    }

    fn contains<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, bool> {
        (**self).contains(hash)
    }
}
