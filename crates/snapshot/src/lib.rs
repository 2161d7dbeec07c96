//! Catwatch Snapshot - versioned histories of catalog items
//!
//! Every tracked item gets its own working directory with an append-only
//! chain of snapshots on top of the content-addressed object store:
//! - Replace the file set and commit it with the upstream update time
//! - Walk history newest-first with per-revision diff stats
//! - Render patches against the parent
//! - Export any revision as a zip archive straight from stored objects

pub mod diff;
pub mod error;
pub mod history;
pub mod item;
pub mod store;

pub use diff::{DiffSummary, FileStat, FileStatus};
pub use error::{Result, SnapshotError};
pub use history::{format_relative_time, History, HistoryIter, SnapshotInfo};
pub use item::{ItemKey, Staging, Worktree};
pub use store::{CommitOutcome, SnapshotStore};

// Snapshot ids are object hashes
pub use cw_core::Blake3Hash as SnapshotId;
