//! In-memory blob store.

use super::BlobStore;
use crate::types::{Hash, StoreFuture};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory blob store. Clones share the same contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<Hash, Vec<u8>>>>,
    puts: Arc<AtomicU64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Number of `put` calls made, including ones for existing blobs.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }
}

impl BlobStore for MemoryBlobStore {
    fn put<'a>(&'a self, content: &'a [u8]) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let hash = Hash::from_bytes(content);
            self.blobs
                .write()
                .entry(hash)
                .or_insert_with(|| content.to_vec());
            Ok(hash)
        })
    }

    fn get<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(self.blobs.read().get(hash).cloned()) })
    }

    fn contains<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.blobs.read().contains_key(hash)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryBlobStore::new();
        let hash = store.put(b"hello").await.unwrap();

        assert_eq!(hash, Hash::from_bytes(b"hello"));
        assert_eq!(store.get(&hash).await.unwrap(), Some(b"hello".to_vec()));
        assert!(store.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_deduplication() {
        let store = MemoryBlobStore::new();
        let h1 = store.put(b"same").await.unwrap();
        let h2 = store.put(b"same").await.unwrap();

        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryBlobStore::new();
        let other = store.clone();
        let hash = store.put(b"shared").await.unwrap();

        assert!(other.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryBlobStore::new();
        let missing = Hash::from_bytes(b"nonexistent");
        assert_eq!(store.get(&missing).await.unwrap(), None);
        assert!(!store.contains(&missing).await.unwrap());
    }
}
