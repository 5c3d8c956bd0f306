//! In-memory pointer store.

use super::PointerStore;
use crate::error::LedgerError;
use crate::types::{Hash, RootAddress, StoreFuture};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory pointer store. Clones share the same slots.
#[derive(Clone, Debug, Default)]
pub struct MemoryPointerStore {
    slots: Arc<RwLock<HashMap<RootAddress, Hash>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without going through the async interface.
    pub fn get(&self, address: &RootAddress) -> Option<Hash> {
        self.slots.read().get(address).copied()
    }

    /// Number of `write` calls made.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PointerStore for MemoryPointerStore {
    fn read<'a>(&'a self, address: &'a RootAddress) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            self.get(address)
                .ok_or_else(|| LedgerError::PointerNotFound(address.clone()))
        })
    }

    fn write<'a>(&'a self, address: &'a RootAddress, value: Hash) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.slots.write().insert(address.clone(), value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_unset_fails() {
        let store = MemoryPointerStore::new();
        let result = store.read(&RootAddress::from("root")).await;
        assert!(matches!(result, Err(LedgerError::PointerNotFound(_))));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryPointerStore::new();
        let addr = RootAddress::from("root");
        let first = Hash::from_bytes(b"1");
        let second = Hash::from_bytes(b"2");

        store.write(&addr, first).await.unwrap();
        store.write(&addr, second).await.unwrap();

        assert_eq!(store.read(&addr).await.unwrap(), second);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let store = MemoryPointerStore::new();
        let a = RootAddress::from("a");
        let b = RootAddress::from("b");

        store.write(&a, Hash::from_bytes(b"a")).await.unwrap();

        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
    }
}
