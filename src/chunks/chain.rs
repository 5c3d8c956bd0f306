//! Chunk chain reader and writer.

use crate::blobs::BlobStore;
use crate::error::{LedgerError, Result};
use crate::types::{Hash, Payload};
use serde::{Deserialize, Serialize};

/// One persisted batch of a topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Hash of the previous chunk (`None` for the first chunk of a topic).
    pub previous: Option<Hash>,

    /// Entries appended by this chunk, in append order.
    pub entries: Vec<Payload>,
}

/// Borrowed form of [`Chunk`] with the identical encoding.
#[derive(Serialize)]
struct ChunkRef<'a> {
    previous: Option<Hash>,
    entries: &'a [Payload],
}

/// Range of a chain to read, relative to its tip.
///
/// Reads cover the chunks after `after` (exclusive, default genesis) up to
/// and including `up_to` (default the tip).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkRange {
    pub after: Option<Hash>,
    pub up_to: Option<Hash>,
}

impl ChunkRange {
    /// The whole chain, genesis to tip.
    pub fn full() -> Self {
        Self::default()
    }

    /// Genesis up to and including `hash`.
    pub fn up_to(hash: Hash) -> Self {
        ChunkRange {
            after: None,
            up_to: Some(hash),
        }
    }

    /// Everything appended after `hash`.
    pub fn after(hash: Hash) -> Self {
        ChunkRange {
            after: Some(hash),
            up_to: None,
        }
    }
}

/// Reads and writes chunk chains in a blob store.
#[derive(Clone)]
pub struct ChunkChain<B: BlobStore> {
    blobs: B,
}

impl<B: BlobStore> ChunkChain<B> {
    pub fn new(blobs: B) -> Self {
        ChunkChain { blobs }
    }

    /// Append a batch after `previous`, returning the new tip.
    pub async fn write(&self, previous: Option<Hash>, entries: &[Payload]) -> Result<Hash> {
        let encoded = rmp_serde::to_vec(&ChunkRef { previous, entries })?;
        self.blobs.put(&encoded).await
    }

    /// Load a single chunk.
    pub async fn load(&self, hash: &Hash) -> Result<Chunk> {
        let data = self
            .blobs
            .get(hash)
            .await?
            .ok_or(LedgerError::BlobNotFound(*hash))?;
        Ok(rmp_serde::from_slice(&data)?)
    }

    /// Read the entries of `range`, walking back from `tip`.
    ///
    /// The result is in append order. A bound that is not an ancestor of
    /// `tip` (or that lies on the wrong side of the other bound) fails with
    /// `ChunkNotInChain`.
    pub async fn read(&self, tip: Hash, range: ChunkRange) -> Result<Vec<Payload>> {
        if range.after.is_some() && range.after == range.up_to {
            return Ok(Vec::new());
        }

        let mut batches = Vec::new();
        let mut collecting = range.up_to.is_none();
        let mut found_after = false;
        let mut current = Some(tip);

        while let Some(hash) = current {
            if range.after == Some(hash) {
                found_after = true;
                break;
            }
            if range.up_to == Some(hash) {
                collecting = true;
            }

            let chunk = self.load(&hash).await?;
            if collecting {
                batches.push(chunk.entries);
            }
            current = chunk.previous;
        }

        if let Some(up_to) = range.up_to {
            if !collecting {
                return Err(LedgerError::ChunkNotInChain {
                    topic: None,
                    hash: up_to,
                });
            }
        }
        if let Some(after) = range.after {
            if !found_after {
                return Err(LedgerError::ChunkNotInChain {
                    topic: None,
                    hash: after,
                });
            }
        }

        Ok(batches.into_iter().rev().flatten().collect())
    }

    /// Chunk hashes from `tip` back to genesis.
    pub async fn history(&self, tip: Hash) -> Result<Vec<Hash>> {
        let mut hashes = Vec::new();
        let mut current = Some(tip);
        while let Some(hash) = current {
            hashes.push(hash);
            current = self.load(&hash).await?.previous;
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MemoryBlobStore;
    use serde_json::json;

    async fn build_chain(chain: &ChunkChain<MemoryBlobStore>) -> (Hash, Hash, Hash) {
        let first = chain.write(None, &[json!("a"), json!("b")]).await.unwrap();
        let second = chain.write(Some(first), &[json!("c")]).await.unwrap();
        let third = chain.write(Some(second), &[json!("d"), json!("e")]).await.unwrap();
        (first, second, third)
    }

    #[tokio::test]
    async fn test_full_read_in_append_order() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (_, _, tip) = build_chain(&chain).await;

        let all = chain.read(tip, ChunkRange::full()).await.unwrap();
        assert_eq!(all, vec![json!("a"), json!("b"), json!("c"), json!("d"), json!("e")]);
    }

    #[tokio::test]
    async fn test_read_up_to() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (_, second, tip) = build_chain(&chain).await;

        let prefix = chain.read(tip, ChunkRange::up_to(second)).await.unwrap();
        assert_eq!(prefix, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_read_after() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (first, _, tip) = build_chain(&chain).await;

        let suffix = chain.read(tip, ChunkRange::after(first)).await.unwrap();
        assert_eq!(suffix, vec![json!("c"), json!("d"), json!("e")]);
    }

    #[tokio::test]
    async fn test_read_between() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (first, second, tip) = build_chain(&chain).await;

        let range = ChunkRange {
            after: Some(first),
            up_to: Some(second),
        };
        assert_eq!(chain.read(tip, range).await.unwrap(), vec![json!("c")]);
    }

    #[tokio::test]
    async fn test_equal_bounds_read_nothing() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (_, second, tip) = build_chain(&chain).await;

        let range = ChunkRange {
            after: Some(second),
            up_to: Some(second),
        };
        assert!(chain.read(tip, range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_bound_rejected() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (_, _, tip) = build_chain(&chain).await;
        let foreign = chain.write(None, &[json!("other topic")]).await.unwrap();

        let result = chain.read(tip, ChunkRange::up_to(foreign)).await;
        assert!(matches!(result, Err(LedgerError::ChunkNotInChain { .. })));

        let result = chain.read(tip, ChunkRange::after(foreign)).await;
        assert!(matches!(result, Err(LedgerError::ChunkNotInChain { .. })));
    }

    #[tokio::test]
    async fn test_inverted_bounds_rejected() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (first, second, tip) = build_chain(&chain).await;

        let range = ChunkRange {
            after: Some(second),
            up_to: Some(first),
        };
        let result = chain.read(tip, range).await;
        assert!(matches!(result, Err(LedgerError::ChunkNotInChain { .. })));
    }

    #[tokio::test]
    async fn test_write_is_content_addressed() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let a = chain.write(None, &[json!({"k": 1, "j": 2})]).await.unwrap();
        let b = chain.write(None, &[json!({"j": 2, "k": 1})]).await.unwrap();
        assert_eq!(a, b);

        let c = chain.write(Some(a), &[json!({"k": 1, "j": 2})]).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_load_roundtrips_chunk() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (first, second, _) = build_chain(&chain).await;

        let chunk = chain.load(&second).await.unwrap();
        assert_eq!(
            chunk,
            Chunk {
                previous: Some(first),
                entries: vec![json!("c")],
            }
        );
    }

    #[tokio::test]
    async fn test_missing_chunk() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let missing = Hash::from_bytes(b"missing");

        let result = chain.read(missing, ChunkRange::full()).await;
        assert!(matches!(result, Err(LedgerError::BlobNotFound(_))));
    }

    #[tokio::test]
    async fn test_history_is_tip_first() {
        let chain = ChunkChain::new(MemoryBlobStore::new());
        let (first, second, tip) = build_chain(&chain).await;

        assert_eq!(chain.history(tip).await.unwrap(), vec![tip, second, first]);
    }
}
