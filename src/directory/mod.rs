//! Content-addressed topic directory.
//!
//! A directory version maps every topic to the tip of its chunk chain.
//! Versions are immutable blobs; the root pointer names the latest one.

mod store;

pub use store::{bootstrap_root, Directory, DirectoryStore};
