//! Append-only chunk chains.
//!
//! Each topic's persisted data is a backward-linked sequence of chunks.
//! A chunk holds one epoch's batch for the topic and the hash of the chunk
//! before it. Chunks are stored as blobs, so a chunk's hash depends only on
//! its batch and its predecessor: rewriting the same batch on the same tip
//! yields the same hash.

mod chain;

pub use chain::{Chunk, ChunkChain, ChunkRange};
