//! Error types for the root writer.

use crate::types::{EpochStep, Hash, RootAddress};
use std::time::Duration;
use thiserror::Error;

/// Main error type for staging, reading and committing.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate entry staged for topic {topic}")]
    DuplicateEntry { topic: String },

    #[error("Root pointer {0} has no value; bootstrap the root before first use")]
    UninitializedRoot(RootAddress),

    #[error("Root writer not initialized")]
    NotInitialized,

    #[error("Epoch failed during {step}: {source}")]
    EpochFailed {
        step: EpochStep,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Blob not found: {0}")]
    BlobNotFound(Hash),

    #[error("Pointer not found: {0}")]
    PointerNotFound(RootAddress),

    #[error("Chunk {hash} is not part of the chain{}", topic_suffix(.topic))]
    ChunkNotInChain { topic: Option<String>, hash: Hash },

    #[error("Pointer store is locked by another process")]
    Locked,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Hash, got: Hash },
}

impl LedgerError {
    /// Wrap a collaborator failure with the epoch step it happened in.
    pub fn at_step(self, step: EpochStep) -> Self {
        LedgerError::EpochFailed {
            step,
            source: Box::new(self),
        }
    }

    /// True for failures that abort an epoch without touching staged data.
    ///
    /// A later `run_epoch` retries the same batch.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::EpochFailed { .. }
                | LedgerError::Timeout { .. }
                | LedgerError::Io(_)
                | LedgerError::BlobNotFound(_)
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for LedgerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LedgerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        LedgerError::Deserialization(e.to_string())
    }
}

fn topic_suffix(topic: &Option<String>) -> String {
    match topic {
        Some(t) => format!(" for topic {}", t),
        None => String::new(),
    }
}

/// Result type for root writer operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
