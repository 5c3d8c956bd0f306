//! File-backed pointer store.

use super::PointerStore;
use crate::error::{LedgerError, Result};
use crate::types::{Hash, RootAddress, StoreFuture};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Magic bytes for the pointer file.
const POINTER_MAGIC: &[u8; 4] = b"PTR\0";

/// Current pointer file format version.
const POINTER_VERSION: u8 = 1;

const POINTER_FILE: &str = "pointers.bin";
const LOCK_FILE: &str = "LOCK";

/// Pointer slots stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PointerIndex {
    slots: HashMap<RootAddress, Hash>,
}

/// Pointer store persisted as a single file in a directory.
///
/// Every write rewrites the whole file through a temp file and rename, then
/// syncs it. Opening takes an exclusive lock on the directory, so two
/// committers on the same machine cannot share a pointer store.
pub struct FilePointerStore {
    /// Directory holding the pointer and lock files.
    path: PathBuf,

    /// In-memory copy of the slots.
    index: RwLock<PointerIndex>,

    /// Serializes file rewrites.
    write_lock: tokio::sync::Mutex<()>,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FilePointerStore {
    /// Open the pointer store in `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;

        let file_path = path.join(POINTER_FILE);
        let index = if file_path.exists() {
            Self::load_from_file(&file_path)?
        } else {
            PointerIndex::default()
        };

        Ok(Self {
            path,
            index: RwLock::new(index),
            write_lock: tokio::sync::Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Directory of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| LedgerError::Locked)?;

        Ok(lock_file)
    }

    fn encode(index: &PointerIndex) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(index)?;

        let mut buf = Vec::with_capacity(4 + 1 + 8 + encoded.len());
        buf.extend_from_slice(POINTER_MAGIC);
        buf.push(POINTER_VERSION);
        buf.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
        buf.extend_from_slice(&encoded);
        Ok(buf)
    }

    fn load_from_file(path: &Path) -> Result<PointerIndex> {
        let mut file = File::open(path)?;

        // Read magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != POINTER_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid pointer file magic".into()));
        }

        // Read version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != POINTER_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported pointer file version: {}",
                version[0]
            )));
        }

        // Read index
        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut encoded = vec![0u8; len];
        file.read_exact(&mut encoded)?;

        Ok(rmp_serde::from_slice(&encoded)?)
    }

    async fn persist(&self, data: Vec<u8>) -> Result<()> {
        let final_path = self.path.join(POINTER_FILE);
        let temp_path = self.path.join(format!("{}.tmp", POINTER_FILE));

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }
}

impl PointerStore for FilePointerStore {
    fn read<'a>(&'a self, address: &'a RootAddress) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            self.index
                .read()
                .slots
                .get(address)
                .copied()
                .ok_or_else(|| LedgerError::PointerNotFound(address.clone()))
        })
    }

    fn write<'a>(&'a self, address: &'a RootAddress, value: Hash) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;

            // The in-memory slot only moves once the file is durable.
            let mut next = self.index.read().clone();
            next.slots.insert(address.clone(), value);
            let data = Self::encode(&next)?;

            self.persist(data).await?;
            *self.index.write() = next;
            Ok(())
        })
    }
}
