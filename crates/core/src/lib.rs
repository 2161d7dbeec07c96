//! Catwatch Core - content-addressed storage primitives for snapshot histories
//!
//! This crate provides the foundational storage layer:
//! - BLAKE3 hashing
//! - Blob storage with compression
//! - Tree representation and diffing
//! - Snapshot objects (one committed revision of an item's file set)
//! - On-disk object store with a `HEAD` ref

pub mod blob;
pub mod error;
pub mod hash;
pub mod snapshot;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use blob::{BlobHeaderV1, BlobStore};
pub use error::{CoreError, ObjectKind, Result};
pub use hash::{hash_bytes, hash_file, Blake3Hash};
pub use snapshot::{Signature, Snapshot};
pub use store::{ObjectStore, META_DIR};
pub use tree::{Entry, Tree, TreeDiff};
