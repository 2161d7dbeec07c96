//! Error types for the object store

use crate::hash::Blake3Hash;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of object held in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Snapshot,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// Integrity and I/O failures of the object store
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid object hash '{0}'")]
    InvalidHash(String),

    #[error("{kind} object {hash} not found")]
    MissingObject { kind: ObjectKind, hash: Blake3Hash },

    #[error("corrupt {kind} object {hash}: {reason}")]
    CorruptObject {
        kind: ObjectKind,
        hash: Blake3Hash,
        reason: String,
    },

    #[error("corrupt HEAD ref at {path}: {reason}")]
    CorruptHead { path: PathBuf, reason: String },

    #[error("no object store at {0}")]
    NotInitialized(PathBuf),

    #[error("unsafe path in tree: {0}")]
    UnsafePath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn corrupt(kind: ObjectKind, hash: Blake3Hash, reason: impl Into<String>) -> Self {
        CoreError::CorruptObject {
            kind,
            hash,
            reason: reason.into(),
        }
    }
}

/// Result type used throughout catwatch-core
pub type Result<T> = std::result::Result<T, CoreError>;
