//! Directory versions and their storage.

use crate::blobs::BlobStore;
use crate::error::{LedgerError, Result};
use crate::pointer::PointerStore;
use crate::types::{Hash, RootAddress, Topic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Mapping from topic to its chunk-chain tip.
///
/// Ordered so that encoding, and therefore the version hash, is a pure
/// function of the mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    topics: BTreeMap<Topic, Hash>,
}

impl Directory {
    /// An empty directory (a dataset with no committed topics).
    pub fn new() -> Self {
        Self::default()
    }

    /// Tip hash of a topic.
    pub fn get(&self, topic: &str) -> Option<Hash> {
        self.topics.get(topic).copied()
    }

    /// All topics, sorted.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> + '_ {
        self.topics.keys()
    }

    /// Topic and tip pairs, sorted by topic.
    pub fn iter(&self) -> impl Iterator<Item = (&Topic, &Hash)> + '_ {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// A new directory with `updates` replacing their topics' tips.
    ///
    /// Topics not named in `updates` carry over unchanged.
    pub fn with_updates<I>(&self, updates: I) -> Directory
    where
        I: IntoIterator<Item = (Topic, Hash)>,
    {
        let mut topics = self.topics.clone();
        topics.extend(updates);
        Directory { topics }
    }
}

impl FromIterator<(Topic, Hash)> for Directory {
    fn from_iter<I: IntoIterator<Item = (Topic, Hash)>>(iter: I) -> Self {
        Directory {
            topics: iter.into_iter().collect(),
        }
    }
}

/// Reads and writes directory versions in a blob store.
#[derive(Clone)]
pub struct DirectoryStore<B: BlobStore> {
    blobs: B,
}

impl<B: BlobStore> DirectoryStore<B> {
    pub fn new(blobs: B) -> Self {
        DirectoryStore { blobs }
    }

    /// Load the directory version stored under `hash`.
    pub async fn read(&self, hash: &Hash) -> Result<Directory> {
        let data = self
            .blobs
            .get(hash)
            .await?
            .ok_or(LedgerError::BlobNotFound(*hash))?;
        Ok(rmp_serde::from_slice(&data)?)
    }

    /// Store a directory version, returning its hash.
    pub async fn write(&self, directory: &Directory) -> Result<Hash> {
        self.blobs.put(&encode(directory)?).await
    }
}

fn encode(directory: &Directory) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(directory)?)
}

/// Provision a fresh dataset: store an empty directory and point the root at it.
///
/// The root writer never does this on its own; a missing root pointer at
/// startup is reported as `UninitializedRoot` instead.
pub async fn bootstrap_root<B, P>(blobs: &B, pointer: &P, address: &RootAddress) -> Result<Hash>
where
    B: BlobStore,
    P: PointerStore,
{
    let hash = blobs.put(&encode(&Directory::new())?).await?;
    pointer.write(address, hash).await?;

    info!(root = %address, directory = %hash, "Bootstrapped empty root");
    Ok(hash)
}
