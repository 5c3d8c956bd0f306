//! In-memory staging buffer.

use crate::error::{LedgerError, Result};
use crate::types::{Payload, StagedEntry, Timestamp, Topic, TopicBatches};
use parking_lot::Mutex;

/// Which staged entries a new payload is compared against for duplicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupScope {
    /// Reject a payload equal to any staged payload, under any topic.
    #[default]
    Payload,
    /// Reject only a payload equal to one staged under the same topic.
    TopicAndPayload,
}

/// Process-local buffer of staged entries, in append order.
///
/// Every operation takes the internal lock once and never suspends, so a
/// snapshot is atomic with respect to concurrent appends.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    entries: Mutex<Vec<StagedEntry>>,
    dedup: DedupScope,
}

impl StagingBuffer {
    pub fn new(dedup: DedupScope) -> Self {
        StagingBuffer {
            entries: Mutex::new(Vec::new()),
            dedup,
        }
    }

    /// Stage a payload for `topic`.
    ///
    /// Fails with `DuplicateEntry` if an equal payload is already staged
    /// (within the configured scope); the buffer is left unchanged.
    pub fn append(&self, topic: impl Into<Topic>, payload: Payload) -> Result<()> {
        let topic = topic.into();
        let mut entries = self.entries.lock();

        let duplicate = entries.iter().any(|e| {
            e.payload == payload
                && match self.dedup {
                    DedupScope::Payload => true,
                    DedupScope::TopicAndPayload => e.topic == topic,
                }
        });
        if duplicate {
            return Err(LedgerError::DuplicateEntry { topic });
        }

        entries.push(StagedEntry {
            timestamp: Timestamp::now(),
            topic,
            payload,
        });
        Ok(())
    }

    /// Staged payloads grouped by topic.
    pub fn contents(&self) -> TopicBatches {
        group_by_topic(&self.entries.lock())
    }

    /// Staged payloads of one topic, in append order.
    pub fn contents_for(&self, topic: &str) -> Vec<Payload> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Topics with at least one staged entry, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        self.contents().into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Take a snapshot of the current contents.
    ///
    /// The snapshot records how many entries existed; completing it removes
    /// that many entries from the front of the buffer, whatever has been
    /// appended since.
    pub fn snapshot(&self) -> Snapshot<'_> {
        let entries = self.entries.lock();
        Snapshot {
            contents: group_by_topic(&entries),
            prefix_len: entries.len(),
            buffer: self,
        }
    }

    fn truncate_prefix(&self, n: usize) {
        let mut entries = self.entries.lock();
        debug_assert!(
            n <= entries.len(),
            "Invariant violated: snapshot prefix {} exceeds buffer length {}",
            n,
            entries.len()
        );
        let n = n.min(entries.len());
        entries.drain(..n);
    }
}

fn group_by_topic(entries: &[StagedEntry]) -> TopicBatches {
    let mut batches = TopicBatches::new();
    for entry in entries {
        batches
            .entry(entry.topic.clone())
            .or_default()
            .push(entry.payload.clone());
    }
    batches
}

/// Point-in-time view of a [`StagingBuffer`] plus its completion handle.
///
/// [`complete`](Snapshot::complete) consumes the snapshot, so it can run at
/// most once. Dropping a snapshot without completing it keeps every entry
/// staged.
#[derive(Debug)]
pub struct Snapshot<'a> {
    contents: TopicBatches,
    prefix_len: usize,
    buffer: &'a StagingBuffer,
}

impl<'a> Snapshot<'a> {
    /// Staged payloads grouped by topic, as of the snapshot.
    pub fn contents(&self) -> &TopicBatches {
        &self.contents
    }

    /// Number of buffer entries the snapshot covers.
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub fn is_empty(&self) -> bool {
        self.prefix_len == 0
    }

    /// Drop the snapshotted entries from the buffer.
    pub fn complete(self) {
        self.buffer.truncate_prefix(self.prefix_len);
    }
}
