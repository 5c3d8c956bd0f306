//! Root pointer storage.
//!
//! A pointer store holds, per root address, the hash of the latest published
//! directory. It is the single commit point of an epoch: everything written
//! before the pointer moves is invisible to readers that resolve through it.
//!
//! Writes are last-writer-wins with no compare-and-swap. One committer per
//! root address is assumed; `FilePointerStore` enforces that per machine with
//! an exclusive lock file, nothing enforces it across machines.

mod faulty;
mod memory;
mod store;

pub use faulty::FaultyPointerStore;
pub use memory::MemoryPointerStore;
pub use store::FilePointerStore;

use crate::types::{Hash, RootAddress, StoreFuture};
use std::sync::Arc;

/// Single-slot-per-address pointer store (the blockchain-like contract).
pub trait PointerStore: Send + Sync + 'static {
    /// Read the current value, failing with `PointerNotFound` if unset.
    fn read<'a>(&'a self, address: &'a RootAddress) -> StoreFuture<'a, Hash>;

    /// Overwrite the value.
    fn write<'a>(&'a self, address: &'a RootAddress, value: Hash) -> StoreFuture<'a, ()>;
}

impl<T: PointerStore + ?Sized> PointerStore for Arc<T> {
    fn read<'a>(&'a self, address: &'a RootAddress) -> StoreFuture<'a, Hash> {
        (**self).read(address)
    }

    fn write<'a>(&'a self, address: &'a RootAddress, value: Hash) -> StoreFuture<'a, ()> {
        (**self).write(address, value)
    }
}
