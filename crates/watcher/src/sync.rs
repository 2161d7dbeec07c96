//! Incremental activity sync bounded by the persisted cursor

use crate::source::ActivitySource;
use cw_catalog::{ActivityRecord, ApiError};
use cw_journal::{ActivityId, CursorError, CursorStore, EntityId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Records requested per feed page
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("activity fetch for entity {entity} at offset {offset} failed: {source}")]
    Fetch {
        entity: EntityId,
        offset: usize,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Result of walking one entity's feed
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub entity: EntityId,
    /// Interesting records newer than the prior cursor, newest first
    pub activities: Vec<ActivityRecord>,
    /// Cursor before the walk
    pub previous: Option<ActivityId>,
    /// Cursor to persist; `None` when nothing newer was seen
    pub new_cursor: Option<ActivityId>,
    /// No cursor existed, so only the first page was read
    pub first_sync: bool,
}

/// Walks activity feeds from "now" back to the stored cursor
///
/// The walk (`collect`) and the cursor write (`advance`) are separate so a
/// caller can deliver the activities in between. A crash before `advance`
/// redelivers them on restart instead of losing them.
pub struct IncrementalSynchronizer {
    source: Arc<dyn ActivitySource>,
    cursors: Arc<CursorStore>,
    page_size: usize,
}

impl IncrementalSynchronizer {
    pub fn new(source: Arc<dyn ActivitySource>, cursors: Arc<CursorStore>, page_size: usize) -> Self {
        Self {
            source,
            cursors,
            page_size: page_size.max(1),
        }
    }

    /// Walk the feed and persist the new cursor
    pub async fn sync(&self, entity: EntityId) -> Result<SyncOutcome, SyncError> {
        let outcome = self.collect(entity).await?;
        self.advance(&outcome)?;
        Ok(outcome)
    }

    /// Walk the feed without touching the stored cursor
    pub async fn collect(&self, entity: EntityId) -> Result<SyncOutcome, SyncError> {
        let previous = self.cursors.cursor(entity)?;
        let mut activities = Vec::new();
        let mut newest: Option<ActivityId> = None;

        let Some(cursor) = previous else {
            // First sync: one page sets the baseline, older history is not chased
            let page = self.page(entity, 0).await?;
            for record in page.records {
                newest = newest.max(Some(record.id));
                if record.is_interesting() {
                    activities.push(record);
                }
            }

            info!(entity, cursor = ?newest, found = activities.len(), "first sync");
            return Ok(SyncOutcome {
                entity,
                activities,
                previous,
                new_cursor: newest,
                first_sync: true,
            });
        };

        let mut offset = 0;
        'pages: loop {
            let page = self.page(entity, offset).await?;
            for record in page.records {
                if record.id == cursor {
                    break 'pages;
                }
                // Out-of-order record already covered by the cursor
                if record.id < cursor {
                    continue;
                }

                newest = newest.max(Some(record.id));
                if record.is_interesting() {
                    activities.push(record);
                }
            }

            if page.fetched < self.page_size {
                break;
            }
            offset += page.fetched;
        }

        let new_cursor = newest.filter(|&id| id > cursor);
        debug!(entity, cursor, new_cursor = ?new_cursor, found = activities.len(), "synced activity");
        Ok(SyncOutcome {
            entity,
            activities,
            previous,
            new_cursor,
            first_sync: false,
        })
    }

    /// Persist the cursor of a completed walk; never moves it backwards
    pub fn advance(&self, outcome: &SyncOutcome) -> Result<Option<ActivityId>, SyncError> {
        match outcome.new_cursor {
            Some(candidate) => Ok(self.cursors.advance(outcome.entity, candidate)?),
            None => Ok(outcome.previous),
        }
    }

    async fn page(&self, entity: EntityId, offset: usize) -> Result<cw_catalog::ActivityPage, SyncError> {
        self.source
            .activity(entity, self.page_size, offset)
            .await
            .map_err(|source| SyncError::Fetch {
                entity,
                offset,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use cw_catalog::ActivityPage;
    use parking_lot::Mutex;

    /// Feed backed by a fixed list, newest first
    struct FakeFeed {
        records: Vec<(u64, &'static str)>,
        fail_at_offset: Option<usize>,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl FakeFeed {
        fn new(records: Vec<(u64, &'static str)>) -> Self {
            Self {
                records,
                fail_at_offset: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ActivitySource for FakeFeed {
        async fn activity(
            &self,
            _entity: EntityId,
            limit: usize,
            offset: usize,
        ) -> Result<ActivityPage, ApiError> {
            self.calls.lock().push((limit, offset));
            if self.fail_at_offset == Some(offset) {
                return Err(ApiError::Status {
                    route: "/activity".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }

            let records: Vec<_> = self
                .records
                .iter()
                .skip(offset)
                .take(limit)
                .map(|&(id, kind)| ActivityRecord {
                    id,
                    kind: kind.to_string(),
                    created_at: Utc::now(),
                    payload: Default::default(),
                })
                .collect();
            Ok(ActivityPage {
                fetched: records.len(),
                records,
            })
        }
    }

    fn setup(feed: FakeFeed, page_size: usize) -> (tempfile::TempDir, Arc<CursorStore>, Arc<FakeFeed>, IncrementalSynchronizer) {
        let dir = tempfile::tempdir().unwrap();
        let cursors = Arc::new(CursorStore::open(dir.path()).unwrap());
        cursors.track(1, "chan", 3).unwrap();
        let feed = Arc::new(feed);
        let sync = IncrementalSynchronizer::new(feed.clone(), Arc::clone(&cursors), page_size);
        (dir, cursors, feed, sync)
    }

    #[tokio::test]
    async fn test_first_sync_sets_baseline_without_interesting() {
        let feed = FakeFeed::new(vec![(30, "achievement"), (20, "rank"), (10, "achievement")]);
        let (_dir, cursors, feed, sync) = setup(feed, 50);

        let outcome = sync.sync(1).await.unwrap();
        assert!(outcome.first_sync);
        assert!(outcome.activities.is_empty());
        assert_eq!(cursors.cursor(1).unwrap(), Some(30));
        assert_eq!(*feed.calls.lock(), vec![(50, 0)]);
    }

    #[tokio::test]
    async fn test_first_sync_reads_single_page() {
        let records = (1..=8).rev().map(|id| (id, "contentUpload")).collect();
        let (_dir, cursors, feed, sync) = setup(FakeFeed::new(records), 5);

        let outcome = sync.sync(1).await.unwrap();
        assert_eq!(outcome.activities.len(), 5);
        assert_eq!(cursors.cursor(1).unwrap(), Some(8));
        assert_eq!(feed.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_walk_stops_at_cursor_across_pages() {
        let mut records: Vec<(u64, &'static str)> = (101..=105).rev().map(|id| (id, "contentUpdate")).collect();
        records.extend((96..=100).rev().map(|id| (id, "contentUpdate")));
        let (_dir, cursors, feed, sync) = setup(FakeFeed::new(records), 5);
        cursors.advance(1, 100).unwrap();

        let outcome = sync.sync(1).await.unwrap();
        let ids: Vec<_> = outcome.activities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![105, 104, 103, 102, 101]);
        assert_eq!(outcome.new_cursor, Some(105));
        assert_eq!(cursors.cursor(1).unwrap(), Some(105));
        assert_eq!(*feed.calls.lock(), vec![(5, 0), (5, 5)]);
    }

    #[tokio::test]
    async fn test_only_interesting_records_are_returned() {
        let records = vec![(104, "achievement"), (103, "contentRevive"), (102, "rank"), (101, "contentUpload"), (100, "contentUpload")];
        let (_dir, cursors, _feed, sync) = setup(FakeFeed::new(records), 50);
        cursors.advance(1, 100).unwrap();

        let outcome = sync.sync(1).await.unwrap();
        let ids: Vec<_> = outcome.activities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![103, 101]);
        // Uninteresting records still move the cursor
        assert_eq!(cursors.cursor(1).unwrap(), Some(104));
    }

    #[tokio::test]
    async fn test_never_returns_ids_at_or_below_cursor() {
        // Feed is not sorted and lost the cursor record
        let records = vec![(120, "contentUpload"), (90, "contentUpload"), (110, "contentUpdate"), (80, "contentUpload")];
        let (_dir, cursors, _feed, sync) = setup(FakeFeed::new(records), 50);
        cursors.advance(1, 100).unwrap();

        let outcome = sync.sync(1).await.unwrap();
        assert!(outcome.activities.iter().all(|a| a.id > 100));
        assert_eq!(outcome.activities.len(), 2);
        assert_eq!(cursors.cursor(1).unwrap(), Some(120));
    }

    #[tokio::test]
    async fn test_no_new_activity_keeps_cursor() {
        let records = vec![(100, "contentUpload"), (99, "contentUpload")];
        let (_dir, cursors, _feed, sync) = setup(FakeFeed::new(records), 50);
        cursors.advance(1, 100).unwrap();

        let outcome = sync.sync(1).await.unwrap();
        assert!(outcome.activities.is_empty());
        assert_eq!(outcome.new_cursor, None);
        assert_eq!(cursors.cursor(1).unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_failed_walk_does_not_advance() {
        let records = (95..=110).rev().map(|id| (id, "contentUpload")).collect();
        let mut feed = FakeFeed::new(records);
        feed.fail_at_offset = Some(5);
        let (_dir, cursors, _feed, sync) = setup(feed, 5);
        cursors.advance(1, 96).unwrap();

        let err = sync.sync(1).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { offset: 5, .. }));
        assert_eq!(cursors.cursor(1).unwrap(), Some(96));
    }

    #[tokio::test]
    async fn test_collect_leaves_cursor_until_advance() {
        let records = vec![(7, "contentUpload"), (6, "contentUpload")];
        let (_dir, cursors, _feed, sync) = setup(FakeFeed::new(records), 50);
        cursors.advance(1, 6).unwrap();

        let outcome = sync.collect(1).await.unwrap();
        assert_eq!(cursors.cursor(1).unwrap(), Some(6));

        assert_eq!(sync.advance(&outcome).unwrap(), Some(7));
        assert_eq!(cursors.cursor(1).unwrap(), Some(7));
    }
}
