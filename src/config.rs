//! Root writer configuration.

use crate::mempool::DedupScope;
use crate::types::RootAddress;
use std::time::Duration;

/// Root writer configuration.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Pointer slot that names the latest directory.
    pub root_address: RootAddress,

    /// Period of the background epoch worker.
    pub epoch_interval: Duration,

    /// Upper bound on each collaborator operation (`None` waits forever).
    pub io_timeout: Option<Duration>,

    /// Duplicate detection scope of the staging buffer.
    pub dedup: DedupScope,

    /// Blob cache size (number of blobs), read by [`FsBlobStore::from_config`].
    ///
    /// [`FsBlobStore::from_config`]: crate::blobs::FsBlobStore::from_config
    pub blob_cache_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root_address: RootAddress::from("root"),
            epoch_interval: Duration::from_secs(1),
            io_timeout: Some(Duration::from_secs(30)),
            dedup: DedupScope::Payload,
            blob_cache_size: 1000,
        }
    }
}

impl LedgerConfig {
    /// Default configuration for `root_address`.
    pub fn new(root_address: impl Into<String>) -> Self {
        Self {
            root_address: RootAddress::new(root_address),
            ..Default::default()
        }
    }

    pub fn with_root_address(mut self, root_address: RootAddress) -> Self {
        self.root_address = root_address;
        self
    }

    pub fn with_epoch_interval(mut self, interval: Duration) -> Self {
        self.epoch_interval = interval;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_dedup(mut self, dedup: DedupScope) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_blob_cache_size(mut self, size: usize) -> Self {
        self.blob_cache_size = size;
        self
    }
}
