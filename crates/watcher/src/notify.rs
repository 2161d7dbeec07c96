//! Hand-off to the notification collaborator
//!
//! The watcher never formats user-facing text; it only describes what
//! changed and who wants to know.

use async_trait::async_trait;
use cw_catalog::{ActivityRecord, ContentItem};
use cw_journal::{EntityId, Observer};
use cw_snapshot::{DiffSummary, SnapshotId};
use std::error::Error;
use thiserror::Error;
use tracing::{error, warn};

/// What happened to an item's history during a resync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReport {
    /// Committed on top of an earlier snapshot
    Diff(DiffSummary),
    /// First snapshot of a newly tracked item; diffs start with the next update
    Baseline,
    /// Files could not be fetched; nothing was committed this tick
    Unavailable { reason: String },
}

/// One resynced item
#[derive(Debug, Clone)]
pub struct ItemUpdate {
    pub item: ContentItem,
    /// Snapshot committed for this update, if any
    pub snapshot: Option<SnapshotId>,
    pub change: ChangeReport,
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// Catalog scan found updated items of a tracked owner
    ItemUpdates {
        observers: Vec<Observer>,
        owner: EntityId,
        updates: Vec<ItemUpdate>,
    },
    /// Activity scan found interesting feed records
    Activity {
        observers: Vec<Observer>,
        entity: EntityId,
        activities: Vec<ActivityRecord>,
    },
}

/// A handler failure forwarded to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Which operation failed, e.g. "activity scan for entity 12"
    pub context: String,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError>;

    async fn report_error(&self, report: ErrorReport) -> Result<(), NotifyError>;
}

/// Pass `Ok` values through; log failures and forward them to the notifier
pub async fn forward_failure<T, E>(
    notifier: &dyn Notifier,
    context: impl Into<String>,
    result: Result<T, E>,
) -> Option<T>
where
    E: Error,
{
    let message = match result {
        Ok(value) => return Some(value),
        Err(err) => error_chain(&err),
    };

    let context = context.into();
    error!(context = %context, error = %message, "handler failed");

    let report = ErrorReport { context, message };
    if let Err(e) = notifier.report_error(report).await {
        warn!(error = %e, "could not forward error report");
    }
    None
}

/// `outer: inner: root` rendering of an error and its sources
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<ErrorReport>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, _notification: Notification) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn report_error(&self, report: ErrorReport) -> Result<(), NotifyError> {
            self.reports.lock().push(report);
            Ok(())
        }
    }

    #[derive(Debug, Error)]
    #[error("outer failed")]
    struct Outer(#[source] std::io::Error);

    #[tokio::test]
    async fn test_ok_passes_through() {
        let recorder = Recorder::default();
        let value = forward_failure(&recorder, "ctx", Ok::<_, NotifyError>(5)).await;
        assert_eq!(value, Some(5));
        assert!(recorder.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_forwarded_with_chain() {
        let recorder = Recorder::default();
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));

        let value: Option<()> = forward_failure(&recorder, "resync 1/2", Err(err)).await;
        assert!(value.is_none());

        let reports = recorder.reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context, "resync 1/2");
        assert_eq!(reports[0].message, "outer failed: disk gone");
    }
}
