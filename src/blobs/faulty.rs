//! Blob store wrapper with fault injection.
//!
//! Wraps any [`BlobStore`] and fails, or holds back, operations on command.
//! Used to exercise the epoch failure paths deterministically.

use super::BlobStore;
use crate::error::LedgerError;
use crate::types::{Hash, StoreFuture};
use parking_lot::Mutex;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use tokio::sync::watch;

/// Counters for the faulty store.
#[derive(Debug, Clone, Default)]
pub struct FaultStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
}

#[derive(Debug, Default)]
struct FaultState {
    pass_puts: u64,
    fail_next_puts: u64,
    fail_next_gets: u64,
    fail_all_puts: bool,
    stats: FaultStats,
}

/// Blob store that injects failures into an inner store.
pub struct FaultyBlobStore<S: BlobStore> {
    inner: S,
    state: Arc<Mutex<FaultState>>,
    paused_tx: Arc<watch::Sender<bool>>,
    paused_rx: watch::Receiver<bool>,
}

impl<S: BlobStore + Clone> Clone for FaultyBlobStore<S> {
    fn clone(&self) -> Self {
        FaultyBlobStore {
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
            paused_tx: Arc::clone(&self.paused_tx),
            paused_rx: self.paused_rx.clone(),
        }
    }
}

impl<S: BlobStore> FaultyBlobStore<S> {
    pub fn new(inner: S) -> Self {
        let (paused_tx, paused_rx) = watch::channel(false);
        FaultyBlobStore {
            inner,
            state: Arc::new(Mutex::new(FaultState::default())),
            paused_tx: Arc::new(paused_tx),
            paused_rx,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `n` puts.
    pub fn fail_next_puts(&self, n: u64) {
        self.fail_puts_after(0, n);
    }

    /// Let `skip` puts through, then fail the following `n`.
    pub fn fail_puts_after(&self, skip: u64, n: u64) {
        let mut state = self.state.lock();
        state.pass_puts = skip;
        state.fail_next_puts = n;
    }

    /// Fail the next `n` gets.
    pub fn fail_next_gets(&self, n: u64) {
        self.state.lock().fail_next_gets = n;
    }

    /// Fail every put until turned off again.
    pub fn fail_all_puts(&self, enabled: bool) {
        self.state.lock().fail_all_puts = enabled;
    }

    /// Hold every put at its start until [`resume_puts`](Self::resume_puts).
    pub fn pause_puts(&self) {
        self.paused_tx.send_replace(true);
    }

    pub fn resume_puts(&self) {
        self.paused_tx.send_replace(false);
    }

    pub fn stats(&self) -> FaultStats {
        self.state.lock().stats.clone()
    }

    /// Decide whether this put fails, consuming one pending failure.
    fn take_put_failure(&self) -> bool {
        let mut state = self.state.lock();
        state.stats.put_attempts += 1;
        let fail = if state.fail_all_puts {
            true
        } else if state.pass_puts > 0 {
            state.pass_puts -= 1;
            false
        } else if state.fail_next_puts > 0 {
            state.fail_next_puts -= 1;
            true
        } else {
            false
        };
        if fail {
            state.stats.put_failures += 1;
        }
        fail
    }

    fn take_get_failure(&self) -> bool {
        let mut state = self.state.lock();
        state.stats.get_attempts += 1;
        if state.fail_next_gets > 0 {
            state.fail_next_gets -= 1;
            state.stats.get_failures += 1;
            true
        } else {
            false
        }
    }
}

impl<S: BlobStore> BlobStore for FaultyBlobStore<S> {
    fn put<'a>(&'a self, content: &'a [u8]) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            let mut paused = self.paused_rx.clone();
            // Closed only if the sender is gone, which cannot happen while self lives.
            let _ = paused.wait_for(|p| !*p).await;

            if self.take_put_failure() {
                return Err(LedgerError::Io(IoError::new(
                    ErrorKind::Other,
                    "injected put failure",
                )));
            }
            self.inner.put(content).await
        })
    }

    fn get<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            if self.take_get_failure() {
                return Err(LedgerError::Io(IoError::new(
                    ErrorKind::Other,
                    "injected get failure",
                )));
            }
            self.inner.get(hash).await
        })
    }

    fn contains<'a>(&'a self, hash: &'a Hash) -> StoreFuture<'a, bool> {
        self.inner.contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MemoryBlobStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fail_next_puts() {
        let store = FaultyBlobStore::new(MemoryBlobStore::new());
        store.fail_next_puts(1);

        assert!(store.put(b"a").await.is_err());
        assert!(store.put(b"a").await.is_ok());

        let stats = store.stats();
        assert_eq!(stats.put_attempts, 2);
        assert_eq!(stats.put_failures, 1);
        assert_eq!(store.inner().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_puts_after() {
        let store = FaultyBlobStore::new(MemoryBlobStore::new());
        store.fail_puts_after(2, 1);

        assert!(store.put(b"a").await.is_ok());
        assert!(store.put(b"b").await.is_ok());
        assert!(store.put(b"c").await.is_err());
        assert!(store.put(b"c").await.is_ok());
        assert_eq!(store.stats().put_failures, 1);
    }

    #[tokio::test]
    async fn test_fail_all_puts_toggle() {
        let store = FaultyBlobStore::new(MemoryBlobStore::new());
        store.fail_all_puts(true);
        assert!(store.put(b"a").await.is_err());
        assert!(store.put(b"b").await.is_err());

        store.fail_all_puts(false);
        assert!(store.put(b"c").await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_next_gets() {
        let store = FaultyBlobStore::new(MemoryBlobStore::new());
        let hash = store.put(b"x").await.unwrap();
        store.fail_next_gets(1);

        assert!(store.get(&hash).await.is_err());
        assert_eq!(store.get(&hash).await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_pause_holds_puts() {
        let store = Arc::new(FaultyBlobStore::new(MemoryBlobStore::new()));
        store.pause_puts();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.put(b"held").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(store.inner().len(), 0);

        store.resume_puts();
        writer.await.unwrap().unwrap();
        assert_eq!(store.inner().len(), 1);
    }
}
