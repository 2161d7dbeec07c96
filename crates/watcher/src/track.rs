//! Starting and stopping to follow an entity

use crate::source::ActivitySource;
use crate::sync::SyncError;
use cw_journal::{ActivityId, CursorStore, EntityId};
use tracing::info;

/// Priority given to observers unless asked otherwise
pub const DEFAULT_PRIORITY: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOutcome {
    /// The entity was not tracked by anyone before
    pub created: bool,
    /// Cursor seeded from the newest feed record
    pub cursor: Option<ActivityId>,
}

/// Track `entity` for `observer`
///
/// A new entity's cursor is seeded with its newest activity id, so tracking
/// starts from "now" instead of replaying old history. The seed is fetched
/// before anything is written; a failed fetch leaves the store untouched.
pub async fn track_entity(
    cursors: &CursorStore,
    source: &dyn ActivitySource,
    entity: EntityId,
    observer: &str,
    priority: u8,
) -> Result<TrackOutcome, SyncError> {
    let seed = if cursors.is_tracked(entity)? {
        None
    } else {
        let page = source
            .activity(entity, 1, 0)
            .await
            .map_err(|source| SyncError::Fetch {
                entity,
                offset: 0,
                source,
            })?;
        page.records.iter().map(|record| record.id).max()
    };

    let created = cursors.track(entity, observer, priority)?;
    let cursor = match seed {
        Some(id) if created => cursors.advance(entity, id)?,
        _ => cursors.cursor(entity)?,
    };

    info!(entity, observer, priority, created, cursor = ?cursor, "tracking entity");
    Ok(TrackOutcome { created, cursor })
}

/// Stop `observer` following `entity`; returns whether it was following
pub fn untrack_entity(cursors: &CursorStore, entity: EntityId, observer: &str) -> Result<bool, SyncError> {
    let removed = cursors.untrack(entity, observer)?;
    info!(entity, observer, removed, "untracked entity");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use cw_catalog::{ActivityPage, ActivityRecord, ApiError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Newest {
        id: Option<u64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActivitySource for Newest {
        async fn activity(
            &self,
            _entity: EntityId,
            limit: usize,
            _offset: usize,
        ) -> Result<ActivityPage, ApiError> {
            assert_eq!(limit, 1);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let records: Vec<_> = self
                .id
                .map(|id| ActivityRecord {
                    id,
                    kind: "achievement".to_string(),
                    created_at: Utc::now(),
                    payload: Default::default(),
                })
                .into_iter()
                .collect();
            Ok(ActivityPage {
                fetched: records.len(),
                records,
            })
        }
    }

    #[tokio::test]
    async fn test_track_seeds_cursor_once() {
        let dir = tempfile::tempdir().unwrap();
        let cursors = CursorStore::open(dir.path()).unwrap();
        let source = Newest {
            id: Some(500),
            calls: AtomicUsize::new(0),
        };

        let first = track_entity(&cursors, &source, 9, "chan-a", DEFAULT_PRIORITY).await.unwrap();
        assert_eq!(first, TrackOutcome { created: true, cursor: Some(500) });

        let second = track_entity(&cursors, &source, 9, "chan-b", 5).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.cursor, Some(500));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cursors.observers(9).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_feed_leaves_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let cursors = CursorStore::open(dir.path()).unwrap();
        let source = Newest {
            id: None,
            calls: AtomicUsize::new(0),
        };

        let outcome = track_entity(&cursors, &source, 9, "chan", DEFAULT_PRIORITY).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.cursor, None);
    }

    #[tokio::test]
    async fn test_untrack() {
        let dir = tempfile::tempdir().unwrap();
        let cursors = CursorStore::open(dir.path()).unwrap();
        cursors.track(9, "chan", 3).unwrap();

        assert!(untrack_entity(&cursors, 9, "chan").unwrap());
        assert!(!untrack_entity(&cursors, 9, "chan").unwrap());
    }
}
