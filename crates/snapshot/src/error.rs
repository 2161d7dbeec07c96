//! Error types for snapshot histories

use crate::item::ItemKey;
use cw_core::{Blake3Hash, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no history for item {0}")]
    UnknownItem(ItemKey),

    #[error("item {0} has no snapshots yet")]
    NoSnapshots(ItemKey),

    #[error("snapshot {id} not found in history of item {item}")]
    UnknownSnapshot { item: ItemKey, id: Blake3Hash },

    #[error("unknown snapshot reference '{reference}' for item {item}")]
    UnknownRef { item: ItemKey, reference: String },

    #[error("ambiguous snapshot prefix '{reference}': matches {matches} snapshots")]
    AmbiguousRef { reference: String, matches: usize },

    #[error("object store: {0}")]
    Core(#[from] CoreError),

    #[error("failed to walk working directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
