//! Catwatch Watcher - change detection and polling
//!
//! This crate provides:
//! - Incremental activity sync against the persisted per-entity cursor
//! - The periodic scheduler driving catalog scans and activity scans
//! - The notification seam and error-forwarding adapter
//! - Track/untrack helpers that seed cursors

pub mod notify;
pub mod scheduler;
pub mod source;
pub mod sync;
pub mod track;

pub use notify::{
    error_chain, forward_failure, ChangeReport, ErrorReport, ItemUpdate, Notification, Notifier,
    NotifyError,
};
pub use scheduler::{
    ActivityPass, CatalogPass, PollScheduler, ScanError, SchedulerConfig, SchedulerHandle,
};
pub use source::{ActivitySource, CatalogSource};
pub use sync::{IncrementalSynchronizer, SyncError, SyncOutcome, DEFAULT_PAGE_SIZE};
pub use track::{track_entity, untrack_entity, TrackOutcome, DEFAULT_PRIORITY};
