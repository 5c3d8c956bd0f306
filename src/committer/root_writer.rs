//! The root writer: staging, read-through queries and epoch commits.

use crate::blobs::BlobStore;
use crate::chunks::{ChunkChain, ChunkRange};
use crate::config::LedgerConfig;
use crate::directory::{Directory, DirectoryStore};
use crate::error::{LedgerError, Result};
use crate::mempool::{Snapshot, StagingBuffer};
use crate::pointer::PointerStore;
use crate::types::{EpochStep, Hash, Payload, RootAddress, Topic, TopicContents};
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commit state of a root writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochPhase {
    Idle,
    Committing,
}

impl EpochPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            COMMITTING => EpochPhase::Committing,
            _ => EpochPhase::Idle,
        }
    }
}

const IDLE: u8 = 0;
const COMMITTING: u8 = 1;

/// Holds the writer in `Committing` for as long as it lives.
struct EpochGuard<'a> {
    phase: &'a AtomicU8,
}

impl<'a> EpochGuard<'a> {
    /// Move `Idle -> Committing`, or `None` if an epoch is already running.
    fn enter(phase: &'a AtomicU8) -> Option<Self> {
        phase
            .compare_exchange(IDLE, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| EpochGuard { phase })
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(IDLE, Ordering::Release);
    }
}

/// What a call to [`RootWriter::run_epoch`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Another epoch was in flight; nothing was touched.
    Skipped,
    /// Nothing was staged; no collaborator was called.
    Empty,
    /// Staged entries were persisted and the root pointer moved.
    Committed(EpochSummary),
}

/// Result of a successful epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochSummary {
    /// Hash of the directory version the root now points at.
    pub directory_hash: Hash,
    /// New chunk tip of every topic committed by the epoch.
    pub updated: BTreeMap<Topic, Hash>,
    /// Number of staged entries committed.
    pub entries: usize,
}

/// Per-topic state reported by [`RootWriter::debug_dump`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSummary {
    pub topic: Topic,
    pub tip: Option<Hash>,
    pub persisted: usize,
    pub staged: usize,
}

/// Cached view of the published root.
#[derive(Clone, Debug)]
struct RootState {
    hash: Hash,
    directory: Directory,
}

/// Stages writes per topic and commits them to a content-addressed dataset.
///
/// The root pointer at `config.root_address` names the latest directory,
/// which names the tip of each topic's chunk chain. An epoch writes new
/// chunks for every staged topic, a directory version that replaces their
/// tips, and finally moves the pointer. Until the pointer moves, nothing the
/// epoch wrote is reachable; a failed epoch leaves the staged entries and
/// the cached root exactly as they were, so running the epoch again retries
/// the same batch.
///
/// Only one writer may commit to a root address at a time. Nothing here
/// elects or fences writers; the pointer store is last-writer-wins.
pub struct RootWriter<B: BlobStore, P: PointerStore> {
    config: LedgerConfig,
    blobs: Arc<B>,
    pointer: P,
    chunks: ChunkChain<Arc<B>>,
    directories: DirectoryStore<Arc<B>>,
    staging: StagingBuffer,
    root: RwLock<Option<RootState>>,
    phase: AtomicU8,
}

impl<B: BlobStore, P: PointerStore> RootWriter<B, P> {
    /// Create a writer. Call [`initialize`](Self::initialize) before use.
    pub fn new(config: LedgerConfig, blobs: B, pointer: P) -> Self {
        let blobs = Arc::new(blobs);
        Self {
            staging: StagingBuffer::new(config.dedup),
            chunks: ChunkChain::new(Arc::clone(&blobs)),
            directories: DirectoryStore::new(Arc::clone(&blobs)),
            blobs,
            pointer,
            config,
            root: RwLock::new(None),
            phase: AtomicU8::new(IDLE),
        }
    }

    /// Create and initialize a writer.
    pub async fn open(config: LedgerConfig, blobs: B, pointer: P) -> Result<Self> {
        let writer = Self::new(config, blobs, pointer);
        writer.initialize().await?;
        Ok(writer)
    }

    /// Load the published root into the cache.
    ///
    /// Fails with `UninitializedRoot` if the pointer has never been written.
    /// Calling it again refreshes the cache from the pointer store.
    pub async fn initialize(&self) -> Result<()> {
        let address = &self.config.root_address;

        let hash = match self.bounded("pointer read", self.pointer.read(address)).await {
            Ok(hash) => hash,
            Err(LedgerError::PointerNotFound(_)) => {
                return Err(LedgerError::UninitializedRoot(address.clone()))
            }
            Err(e) => return Err(e),
        };
        let directory = self
            .bounded("directory read", self.directories.read(&hash))
            .await?;

        info!(
            root = %address,
            directory = %hash,
            topics = directory.len(),
            "Root writer initialized"
        );
        *self.root.write() = Some(RootState { hash, directory });
        Ok(())
    }

    /// Stage `payload` for `topic` until the next epoch.
    pub fn append_data(&self, topic: impl Into<Topic>, payload: Payload) -> Result<()> {
        self.staging.append(topic, payload)
    }

    /// Everything committed to `topic` (up to `up_to`, if given) followed by
    /// everything still staged for it.
    ///
    /// The returned hash is the persisted tip the read resolved, `None` if
    /// the topic has never been committed.
    pub async fn topic_contents(&self, topic: &str, up_to: Option<Hash>) -> Result<TopicContents> {
        // Tip and staged entries are taken together so a concurrent commit
        // cannot make entries vanish or appear twice.
        let (tip, staged) = {
            let root = self.root.read();
            let state = root.as_ref().ok_or(LedgerError::NotInitialized)?;
            (state.directory.get(topic), self.staging.contents_for(topic))
        };

        let mut data = match (tip, up_to) {
            (Some(tip), up_to) => self
                .bounded(
                    "chunk read",
                    self.chunks.read(tip, ChunkRange { after: None, up_to }),
                )
                .await
                .map_err(|e| attach_topic(e, topic))?,
            (None, Some(hash)) => {
                return Err(LedgerError::ChunkNotInChain {
                    topic: Some(topic.to_string()),
                    hash,
                })
            }
            (None, None) => Vec::new(),
        };
        data.extend(staged);

        Ok(TopicContents { data, hash: tip })
    }

    /// Commit everything staged so far.
    ///
    /// Returns `Skipped` without side effects if an epoch is already in
    /// flight and `Empty` without calling any collaborator if nothing is
    /// staged. A collaborator failure is returned as `EpochFailed` tagged
    /// with the failing step; staged entries and the cached root are left
    /// untouched and the writer is back to `Idle`.
    pub async fn run_epoch(&self) -> Result<EpochOutcome> {
        let Some(_guard) = EpochGuard::enter(&self.phase) else {
            debug!(root = %self.config.root_address, "Epoch already in flight, skipping");
            return Ok(EpochOutcome::Skipped);
        };

        let current = self.current_root()?;
        let snapshot = self.staging.snapshot();
        if snapshot.is_empty() {
            debug!(root = %self.config.root_address, "Nothing staged, epoch is empty");
            return Ok(EpochOutcome::Empty);
        }

        match self.commit(current, snapshot).await {
            Ok(summary) => {
                info!(
                    root = %self.config.root_address,
                    directory = %summary.directory_hash,
                    topics = summary.updated.len(),
                    entries = summary.entries,
                    "Epoch committed"
                );
                Ok(EpochOutcome::Committed(summary))
            }
            Err(e) => {
                warn!(
                    root = %self.config.root_address,
                    error = %e,
                    "Epoch failed, staged entries retained"
                );
                Err(e)
            }
        }
    }

    async fn commit(&self, current: RootState, snapshot: Snapshot<'_>) -> Result<EpochSummary> {
        let writes: Vec<_> = snapshot
            .contents()
            .iter()
            .map(|(topic, entries)| {
                let previous = current.directory.get(topic);
                async move {
                    let tip = self
                        .bounded("chunk write", self.chunks.write(previous, entries))
                        .await
                        .map_err(|e| e.at_step(EpochStep::ChunkWrite))?;
                    Ok::<_, LedgerError>((topic.clone(), tip))
                }
            })
            .collect();
        let updated: BTreeMap<Topic, Hash> = try_join_all(writes).await?.into_iter().collect();

        let directory = current.directory.with_updates(updated.clone());
        let directory_hash = self
            .bounded("directory write", self.directories.write(&directory))
            .await
            .map_err(|e| e.at_step(EpochStep::DirectoryWrite))?;

        self.bounded(
            "pointer write",
            self.pointer.write(&self.config.root_address, directory_hash),
        )
        .await
        .map_err(|e| e.at_step(EpochStep::PointerWrite))?;

        let entries = snapshot.prefix_len();
        {
            // Cache swap and buffer prune happen under one lock so readers
            // never see both the new tip and the committed entries as staged.
            let mut root = self.root.write();
            *root = Some(RootState {
                hash: directory_hash,
                directory,
            });
            snapshot.complete();
        }

        Ok(EpochSummary {
            directory_hash,
            updated,
            entries,
        })
    }

    /// Per-topic tip, persisted and staged counts, also logged at debug level.
    pub async fn debug_dump(&self) -> Result<Vec<TopicSummary>> {
        let current = self.current_root()?;
        let staged = self.staging.contents();

        let topics: BTreeSet<&Topic> = current.directory.topics().chain(staged.keys()).collect();

        let mut summaries = Vec::with_capacity(topics.len());
        for topic in topics {
            let tip = current.directory.get(topic);
            let persisted = match tip {
                Some(tip) => self.chunks.read(tip, ChunkRange::full()).await?.len(),
                None => 0,
            };
            let staged = staged.get(topic).map_or(0, Vec::len);

            debug!(topic = %topic, tip = ?tip, persisted, staged, "Topic");
            summaries.push(TopicSummary {
                topic: topic.clone(),
                tip,
                persisted,
                staged,
            });
        }

        debug!(
            root = %self.config.root_address,
            directory = ?self.root_hash(),
            topics = summaries.len(),
            "Root writer dump"
        );
        Ok(summaries)
    }

    /// Hash of the directory the cache reflects.
    pub fn root_hash(&self) -> Option<Hash> {
        self.root.read().as_ref().map(|s| s.hash)
    }

    /// The cached directory.
    pub fn directory(&self) -> Option<Directory> {
        self.root.read().as_ref().map(|s| s.directory.clone())
    }

    pub fn phase(&self) -> EpochPhase {
        EpochPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Number of entries waiting for an epoch.
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    pub fn root_address(&self) -> &RootAddress {
        &self.config.root_address
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn pointer(&self) -> &P {
        &self.pointer
    }

    fn current_root(&self) -> Result<RootState> {
        self.root.read().clone().ok_or(LedgerError::NotInitialized)
    }

    /// Run a collaborator call under the configured timeout.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.io_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| LedgerError::Timeout { operation, after })?,
            None => call.await,
        }
    }
}

fn attach_topic(err: LedgerError, topic: &str) -> LedgerError {
    match err {
        LedgerError::ChunkNotInChain { topic: None, hash } => LedgerError::ChunkNotInChain {
            topic: Some(topic.to_string()),
            hash,
        },
        other => other,
    }
}
