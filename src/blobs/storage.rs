//! Filesystem blob storage.

use super::BlobStore;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::types::{Hash, StoreFuture};
use lru::LruCache;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Magic bytes for blob files.
const BLOB_MAGIC: &[u8; 4] = b"BLB\0";

/// Current blob format version.
const BLOB_VERSION: u8 = 1;

/// Header size: magic + version + content length.
const BLOB_HEADER_SIZE: usize = 4 + 1 + 8;

/// Trailer size: CRC32 of the content.
const BLOB_TRAILER_SIZE: usize = 4;

/// Content-addressed blob storage on local disk.
///
/// Blobs are sharded into directories by the first byte of their hash.
/// Each file is written to a temporary name and renamed into place, so a
/// crash never leaves a partially written blob under its final name.
pub struct FsBlobStore {
    /// Base directory for blobs.
    path: PathBuf,

    /// LRU cache for recently accessed blobs.
    cache: Mutex<LruCache<Hash, Vec<u8>>>,

    /// Suffix source for temp file names.
    next_temp: AtomicU64,
}

impl FsBlobStore {
    /// Create a new blob storage at the given path.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            cache: Mutex::new(LruCache::new(cache_size)),
            next_temp: AtomicU64::new(0),
        })
    }

    /// Create a blob storage sized by `config.blob_cache_size`.
    pub fn from_config(path: impl AsRef<Path>, config: &LedgerConfig) -> Result<Self> {
        Self::new(path, config.blob_cache_size)
    }

    /// Maximum number of blobs held in the read cache.
    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }

    /// Base directory of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the shard directory for a hash.
    fn shard_path(&self, hash: &Hash) -> PathBuf {
        self.path.join(hash.shard_prefix())
    }

    /// Get the full path for a blob.
    fn blob_path(&self, hash: &Hash) -> PathBuf {
        self.shard_path(hash).join(hash.to_hex())
    }

    /// Unique temp path next to a blob, so concurrent puts never share one.
    fn temp_path(&self, hash: &Hash) -> PathBuf {
        let n = self.next_temp.fetch_add(1, Ordering::Relaxed);
        self.shard_path(hash)
            .join(format!("{}.{}-{}.tmp", hash.to_hex(), std::process::id(), n))
    }

    /// Write, sync and rename a blob file into place.
    async fn write_blob(&self, hash: &Hash, content: &[u8]) -> Result<()> {
        let blob_path = self.blob_path(hash);
        let temp_path = self.temp_path(hash);

        let mut file = tokio::fs::File::create(&temp_path).await?;
        let written = async {
            file.write_all(&Self::encode(content)).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &blob_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            // Another put of the same content got there first
            if tokio::fs::try_exists(&blob_path).await.unwrap_or(false) {
                return Ok(());
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn encode(content: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOB_HEADER_SIZE + content.len() + BLOB_TRAILER_SIZE);
        buf.extend_from_slice(BLOB_MAGIC);
        buf.push(BLOB_VERSION);
        buf.extend_from_slice(&(content.len() as u64).to_le_bytes());
        buf.extend_from_slice(content);
        buf.extend_from_slice(&crc32fast::hash(content).to_le_bytes());
        buf
    }

    fn decode(hash: &Hash, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < BLOB_HEADER_SIZE + BLOB_TRAILER_SIZE {
            return Err(LedgerError::InvalidFormat(format!(
                "Blob {} truncated ({} bytes)",
                hash,
                data.len()
            )));
        }

        if &data[0..4] != BLOB_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid blob magic".into()));
        }

        if data[4] != BLOB_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported blob version: {}",
                data[4]
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[5..BLOB_HEADER_SIZE]);
        let content_len = usize::try_from(u64::from_le_bytes(len_bytes)).ok();
        let expected_len = content_len
            .and_then(|len| len.checked_add(BLOB_HEADER_SIZE + BLOB_TRAILER_SIZE));

        let content_len = match (content_len, expected_len) {
            (Some(len), Some(expected)) if expected == data.len() => len,
            _ => {
                return Err(LedgerError::InvalidFormat(format!(
                    "Blob {} length mismatch",
                    hash
                )))
            }
        };

        let content = &data[BLOB_HEADER_SIZE..BLOB_HEADER_SIZE + content_len];

        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&data[BLOB_HEADER_SIZE + content_len..]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(content);

        if stored_checksum != computed_checksum {
            return Err(LedgerError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let computed_hash = Hash::from_bytes(content);
        if &computed_hash != hash {
            return Err(LedgerError::HashMismatch {
                expected: *hash,
                got: computed_hash,
            });
        }

        Ok(content.to_vec())
    }

    async fn exists(&self, hash: &Hash) -> Result<bool> {
        let cached = self.cache.lock().contains(hash);
        if cached {
            return Ok(true);
        }
        Ok(tokio::fs::try_exists(self.blob_path(hash)).await?)
    }
}

impl BlobStore for FsBlobStore {
    fn put<'a>(&'a self, content: &'a [u8]) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            let hash = Hash::from_bytes(content);

            if self.exists(&hash).await? {
                return Ok(hash);
            }

            tokio::fs::create_dir_all(self.shard_path(&hash)).await?;
            self.write_blob(&hash, content).await?;

            self.cache.lock().put(hash, content.to_vec());

            Ok(hash)
        })
    }

    fn get<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let cached = self.cache.lock().get(hash).cloned();
            if cached.is_some() {
                return Ok(cached);
            }

            let data = match tokio::fs::read(self.blob_path(hash)).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let content = Self::decode(hash, &data)?;
            self.cache.lock().put(*hash, content.clone());

            Ok(Some(content))
        })
    }

    fn contains<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, bool> {
        Box::pin(self.exists(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStore::new(dir.path().join("blobs"), 100).unwrap();

        let content = b"Hello, world!";
        let hash = storage.put(content).await.unwrap();

        let blob = storage.get(&hash).await.unwrap().unwrap();
        assert_eq!(blob, content);
    }

    #[tokio::test]
    async fn test_deduplication() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStore::new(dir.path().join("blobs"), 100).unwrap();

        let content = b"Same content";
        let hash1 = storage.put(content).await.unwrap();
        let hash2 = storage.put(content).await.unwrap();

        assert_eq!(hash1, hash2);
    }

    #[tokio::test]
    async fn test_read_without_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blobs");

        let hash = {
            let storage = FsBlobStore::new(&path, 100).unwrap();
            storage.put(b"persisted").await.unwrap()
        };

        let reopened = FsBlobStore::new(&path, 100).unwrap();
        assert!(reopened.contains(&hash).await.unwrap());
        assert_eq!(reopened.get(&hash).await.unwrap().unwrap(), b"persisted");
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStore::new(dir.path().join("blobs"), 100).unwrap();

        let other_hash = Hash::from_bytes(b"nonexistent");
        assert!(!storage.contains(&other_hash).await.unwrap());
        assert!(storage.get(&other_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blobs");

        let hash = {
            let storage = FsBlobStore::new(&path, 100).unwrap();
            storage.put(b"will be corrupted").await.unwrap()
        };

        let blob_path = path.join(hash.shard_prefix()).join(hash.to_hex());
        let mut raw = std::fs::read(&blob_path).unwrap();
        raw[BLOB_HEADER_SIZE] ^= 0xFF;
        std::fs::write(&blob_path, raw).unwrap();

        let reopened = FsBlobStore::new(&path, 100).unwrap();
        let result = reopened.get(&hash).await;
        assert!(matches!(result, Err(LedgerError::ChecksumMismatch { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_identical_puts() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FsBlobStore::new(dir.path().join("blobs"), 0).unwrap());

        for round in 0..50u32 {
            let content: Vec<u8> = (0..100_000u32)
                .map(|i| (i.wrapping_mul(31) ^ round) as u8)
                .collect();
            let expected = Hash::from_bytes(&content);

            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let storage = Arc::clone(&storage);
                    let content = content.clone();
                    tokio::spawn(async move { storage.put(&content).await })
                })
                .collect();

            for task in tasks {
                assert_eq!(task.await.unwrap().unwrap(), expected);
            }

            let reopened = FsBlobStore::new(dir.path().join("blobs"), 1).unwrap();
            assert_eq!(reopened.get(&expected).await.unwrap(), Some(content));
        }

        // No temp files left behind
        for shard in std::fs::read_dir(dir.path().join("blobs")).unwrap() {
            for entry in std::fs::read_dir(shard.unwrap().path()).unwrap() {
                let name = entry.unwrap().file_name();
                assert!(!name.to_string_lossy().ends_with(".tmp"));
            }
        }
    }

    #[test]
    fn test_from_config_uses_cache_size() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig::default().with_blob_cache_size(7);

        let storage = FsBlobStore::from_config(dir.path().join("blobs"), &config).unwrap();
        assert_eq!(storage.cache_capacity(), 7);
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let hash = Hash::from_bytes(b"abc");
        let mut encoded = FsBlobStore::encode(b"abc");
        encoded[5..BLOB_HEADER_SIZE].copy_from_slice(&u64::MAX.to_le_bytes());

        let result = FsBlobStore::decode(&hash, &encoded);
        assert!(matches!(result, Err(LedgerError::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let hash = Hash::from_bytes(b"abc");
        let mut encoded = FsBlobStore::encode(b"abc");
        encoded[0] = b'X';

        let result = FsBlobStore::decode(&hash, &encoded);
        assert!(matches!(result, Err(LedgerError::InvalidFormat(_))));
    }
}
