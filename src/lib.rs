//! # Root Writer
//!
//! A topic-partitioned, append-only dataset published through a single
//! mutable root pointer.
//!
//! ## Core Concepts
//!
//! - **Topics**: Named partitions; each has its own hash-linked chunk chain
//! - **Staging buffer**: Writes wait in memory until the next epoch
//! - **Epochs**: One commit writes a chunk per touched topic, a new
//!   directory version, then moves the root pointer
//! - **Blobs**: Chunks and directories are content-addressed blobs
//!
//! ## Example
//!
//! ```ignore
//! use rootwriter::{bootstrap_root, LedgerConfig, MemoryBlobStore, MemoryPointerStore, RootWriter};
//! use serde_json::json;
//!
//! let blobs = MemoryBlobStore::new();
//! let pointer = MemoryPointerStore::new();
//! let config = LedgerConfig::new("my-dataset");
//!
//! // Provision the root once
//! bootstrap_root(&blobs, &pointer, &config.root_address).await?;
//!
//! let writer = RootWriter::open(config, blobs, pointer).await?;
//! writer.append_data("events", json!({"kind": "created"}))?;
//! writer.run_epoch().await?;
//!
//! let contents = writer.topic_contents("events", None).await?;
//! ```

pub mod blobs;
pub mod chunks;
pub mod committer;
pub mod config;
pub mod directory;
pub mod error;
pub mod mempool;
pub mod pointer;
pub mod types;

// Re-exports
pub use blobs::{BlobStore, FaultStats, FaultyBlobStore, FsBlobStore, MemoryBlobStore};
pub use chunks::{Chunk, ChunkChain, ChunkRange};
pub use committer::{
    EpochOutcome, EpochPhase, EpochSummary, EpochWorker, EpochWorkerHandle, RootWriter,
    TopicSummary,
};
pub use config::LedgerConfig;
pub use directory::{bootstrap_root, Directory, DirectoryStore};
pub use error::{LedgerError, Result};
pub use mempool::{DedupScope, Snapshot, StagingBuffer};
pub use pointer::{FaultyPointerStore, FilePointerStore, MemoryPointerStore, PointerStore};
pub use types::*;
