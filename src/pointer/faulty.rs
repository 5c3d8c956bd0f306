//! Pointer store wrapper with fault injection.

use super::PointerStore;
use crate::error::LedgerError;
use crate::types::{Hash, RootAddress, StoreFuture};
use parking_lot::Mutex;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    fail_next_reads: u64,
    fail_next_writes: u64,
    write_attempts: u64,
    write_failures: u64,
}

/// Pointer store that fails reads or writes of an inner store on command.
pub struct FaultyPointerStore<S: PointerStore> {
    inner: S,
    state: Arc<Mutex<FaultState>>,
}

impl<S: PointerStore + Clone> Clone for FaultyPointerStore<S> {
    fn clone(&self) -> Self {
        FaultyPointerStore {
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: PointerStore> FaultyPointerStore<S> {
    pub fn new(inner: S) -> Self {
        FaultyPointerStore {
            inner,
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail_next_reads(&self, n: u64) {
        self.state.lock().fail_next_reads = n;
    }

    pub fn fail_next_writes(&self, n: u64) {
        self.state.lock().fail_next_writes = n;
    }

    pub fn write_attempts(&self) -> u64 {
        self.state.lock().write_attempts
    }

    pub fn write_failures(&self) -> u64 {
        self.state.lock().write_failures
    }
}

impl<S: PointerStore> PointerStore for FaultyPointerStore<S> {
    fn read<'a>(&'a self, address: &'a RootAddress) -> StoreFuture<'a, Hash> {
        Box::pin(async move {
            let fail = {
                let mut state = self.state.lock();
                if state.fail_next_reads > 0 {
                    state.fail_next_reads -= 1;
                    true
                } else {
                    false
                }
            };
            if fail {
                return Err(LedgerError::Io(IoError::new(
                    ErrorKind::Other,
                    "injected pointer read failure",
                )));
            }
            self.inner.read(address).await
        })
    }

    fn write<'a>(&'a self, address: &'a RootAddress, value: Hash) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let fail = {
                let mut state = self.state.lock();
                state.write_attempts += 1;
                if state.fail_next_writes > 0 {
                    state.fail_next_writes -= 1;
                    state.write_failures += 1;
                    true
                } else {
                    false
                }
            };
            if fail {
                return Err(LedgerError::Io(IoError::new(
                    ErrorKind::Other,
                    "injected pointer write failure",
                )));
            }
            self.inner.write(address, value).await
        })
    }
}
