//! Core types for the root writer.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Named partition of the dataset.
pub type Topic = String;

/// Opaque staged value.
///
/// JSON objects compare by content, so key order never affects equality.
pub type Payload = serde_json::Value;

/// Staged payloads grouped by topic, each list in append order.
pub type TopicBatches = BTreeMap<Topic, Vec<Payload>>;

/// Future returned by collaborator calls (blob, pointer store).
pub type StoreFuture<'a, T> = BoxFuture<'a, crate::error::Result<T>>;

/// Content hash (SHA-256) of a blob, chunk or directory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }

    /// Get the first two characters of the hex (for sharding).
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[0..1])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Stable identifier of the root pointer slot.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RootAddress(pub String);

impl RootAddress {
    pub fn new(address: impl Into<String>) -> Self {
        RootAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RootAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootAddress({})", self.0)
    }
}

impl fmt::Display for RootAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RootAddress {
    fn from(s: &str) -> Self {
        RootAddress(s.to_string())
    }
}

/// A write waiting in the staging buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedEntry {
    /// When the entry was staged.
    pub timestamp: Timestamp,

    /// Topic the entry belongs to.
    pub topic: Topic,

    /// The staged value.
    pub payload: Payload,
}

/// Result of a read-through topic query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopicContents {
    /// Persisted entries followed by still-staged entries, in append order.
    pub data: Vec<Payload>,

    /// Persisted chain tip used for the read (`None` if never committed).
    pub hash: Option<Hash>,
}

/// Collaborator step of an epoch commit, carried by epoch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EpochStep {
    ChunkWrite,
    DirectoryWrite,
    PointerWrite,
}

impl fmt::Display for EpochStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpochStep::ChunkWrite => "chunk write",
            EpochStep::DirectoryWrite => "directory write",
            EpochStep::PointerWrite => "pointer write",
        };
        f.write_str(name)
    }
}
