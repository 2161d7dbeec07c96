//! Periodic catalog and activity scans
//!
//! Two independent fixed-interval loops:
//! - catalog scan: pending listing -> tracked owners -> resync + snapshot
//! - activity scan: per tracked entity incremental sync -> notify
//!
//! A failing entity or item is logged and reported; the loop carries on
//! and the next tick is the retry.

use crate::notify::{forward_failure, ChangeReport, ItemUpdate, Notification, Notifier, NotifyError};
use crate::source::{ActivitySource, CatalogSource};
use crate::sync::{IncrementalSynchronizer, SyncError, DEFAULT_PAGE_SIZE};
use chrono::{DateTime, Utc};
use cw_catalog::{ApiError, ContentItem};
use cw_journal::{CursorError, CursorStore, EntityId};
use cw_snapshot::{ItemKey, SnapshotError, SnapshotStore};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("catalog request failed: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub catalog_interval: Duration,
    pub activity_interval: Duration,
    pub page_size: usize,
    /// Trust the pending listing to be sorted newest-first and stop at the
    /// first item not newer than the watermark
    pub assume_sorted: bool,
    /// Author email recorded on snapshots
    pub author_email: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catalog_interval: Duration::from_secs(30),
            activity_interval: Duration::from_secs(60),
            page_size: DEFAULT_PAGE_SIZE,
            assume_sorted: false,
            author_email: "nobody@localhost".to_string(),
        }
    }
}

/// Counters of one catalog scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPass {
    pub listed: usize,
    pub matched: usize,
    pub committed: usize,
    pub failures: usize,
}

/// Counters of one activity scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityPass {
    pub entities: usize,
    pub notified: usize,
    pub failures: usize,
}

/// Drives both polling loops; all loop state lives here
pub struct PollScheduler {
    catalog: Arc<dyn CatalogSource>,
    cursors: Arc<CursorStore>,
    snapshots: SnapshotStore,
    notifier: Arc<dyn Notifier>,
    synchronizer: IncrementalSynchronizer,
    config: SchedulerConfig,
    /// Newest `last_updated` seen in the pending listing
    watermark: Mutex<DateTime<Utc>>,
    /// Items whose last resync did not commit, retried regardless of the
    /// watermark until they do or leave the listing
    retry: Mutex<HashSet<ItemKey>>,
    /// Serializes commits per item; entries live only while in use
    item_locks: DashMap<ItemKey, Arc<tokio::sync::Mutex<()>>>,
}

impl PollScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        activity: Arc<dyn ActivitySource>,
        cursors: Arc<CursorStore>,
        snapshots: SnapshotStore,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            synchronizer: IncrementalSynchronizer::new(activity, Arc::clone(&cursors), config.page_size),
            catalog,
            cursors,
            snapshots,
            notifier,
            config,
            watermark: Mutex::new(Utc::now()),
            retry: Mutex::new(HashSet::new()),
            item_locks: DashMap::new(),
        }
    }

    /// Start the catalog scan from `watermark` instead of the current time
    pub fn with_watermark(self, watermark: DateTime<Utc>) -> Self {
        *self.watermark.lock() = watermark;
        self
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        *self.watermark.lock()
    }

    /// Items queued for another resync attempt
    pub fn pending_retries(&self) -> Vec<ItemKey> {
        let mut keys: Vec<ItemKey> = self.retry.lock().iter().copied().collect();
        keys.sort();
        keys
    }

    /// Items with a resync in flight
    pub fn locked_items(&self) -> usize {
        self.item_locks.len()
    }

    pub fn synchronizer(&self) -> &IncrementalSynchronizer {
        &self.synchronizer
    }

    /// Spawn both loops
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();

        let catalog_loop = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(run_periodic(
                "catalog",
                self.config.catalog_interval,
                cancel.child_token(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move {
                        scheduler.scan_catalog().await;
                    }
                },
            ))
        };

        let activity_loop = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(run_periodic(
                "activity",
                self.config.activity_interval,
                cancel.child_token(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move {
                        scheduler.scan_activity().await;
                    }
                },
            ))
        };

        SchedulerHandle {
            cancel,
            tasks: vec![catalog_loop, activity_loop],
        }
    }

    /// One catalog pass
    ///
    /// A listing failure leaves the watermark untouched so the next tick
    /// sees the same window again.
    pub async fn scan_catalog(&self) -> CatalogPass {
        let mut pass = CatalogPass::default();

        let groups = match self.pending_by_owner(&mut pass).await {
            Ok(groups) => groups,
            Err(e) => {
                pass.failures += 1;
                forward_failure(self.notifier.as_ref(), "catalog scan", Err::<(), _>(e)).await;
                return pass;
            }
        };

        for (owner, items) in groups {
            let observers = match self.cursors.observers(owner) {
                Ok(observers) => observers,
                Err(e) => {
                    pass.failures += 1;
                    for item in &items {
                        self.mark_for_retry(item);
                    }
                    let context = format!("observers of entity {}", owner);
                    forward_failure(self.notifier.as_ref(), context, Err::<(), _>(e)).await;
                    continue;
                }
            };

            // Resync the owner's items together, then use the joined results
            let results = join_all(items.iter().map(|item| self.resync_item(item))).await;

            let mut updates = Vec::with_capacity(results.len());
            for (item, result) in items.iter().zip(results) {
                let context = format!("resync of item {}/{}", item.owner_id, item.id);
                if let Some(update) = forward_failure(self.notifier.as_ref(), context, result).await {
                    if update.snapshot.is_some() {
                        pass.committed += 1;
                        self.retry.lock().remove(&ItemKey::new(item.owner_id, item.id));
                    } else {
                        self.mark_for_retry(item);
                    }
                    updates.push(update);
                } else {
                    pass.failures += 1;
                    self.mark_for_retry(item);
                }
            }

            if updates.is_empty() || observers.is_empty() {
                continue;
            }

            let notification = Notification::ItemUpdates {
                observers,
                owner,
                updates,
            };
            let context = format!("item notification for entity {}", owner);
            let delivered = self.notifier.deliver(notification).await;
            if forward_failure(self.notifier.as_ref(), context, delivered).await.is_none() {
                pass.failures += 1;
            }
        }

        info!(
            listed = pass.listed,
            matched = pass.matched,
            committed = pass.committed,
            failures = pass.failures,
            watermark = %self.watermark(),
            "catalog scan finished"
        );
        pass
    }

    /// One activity pass over every tracked entity
    pub async fn scan_activity(&self) -> ActivityPass {
        let mut pass = ActivityPass::default();

        let entities = match self.cursors.tracked_entities() {
            Ok(entities) => entities,
            Err(e) => {
                pass.failures += 1;
                forward_failure(self.notifier.as_ref(), "activity scan", Err::<(), _>(e)).await;
                return pass;
            }
        };

        for entity in entities {
            pass.entities += 1;
            let result = self.sync_entity(entity).await;
            let context = format!("activity scan for entity {}", entity);
            match forward_failure(self.notifier.as_ref(), context, result).await {
                Some(true) => pass.notified += 1,
                Some(false) => {}
                None => pass.failures += 1,
            }
        }

        debug!(
            entities = pass.entities,
            notified = pass.notified,
            failures = pass.failures,
            "activity scan finished"
        );
        pass
    }

    /// Sync one entity, deliver its activity, then persist the cursor
    ///
    /// Returns whether a notification went out.
    pub async fn sync_entity(&self, entity: EntityId) -> Result<bool, ScanError> {
        let outcome = self.synchronizer.collect(entity).await?;

        let mut notified = false;
        if !outcome.activities.is_empty() {
            let observers = self.cursors.observers(entity)?;
            if !observers.is_empty() {
                self.notifier
                    .deliver(Notification::Activity {
                        observers,
                        entity,
                        activities: outcome.activities.clone(),
                    })
                    .await?;
                notified = true;
            }
        }

        // Only after delivery, so a failure above means redelivery next tick
        self.synchronizer.advance(&outcome)?;
        Ok(notified)
    }

    /// Fetch an item by id and resync it
    pub async fn resync(&self, item_id: u64) -> Result<ItemUpdate, ScanError> {
        let item = self.catalog.item(item_id).await?;
        self.resync_item(&item).await
    }

    /// Download the item's current files and commit them as a snapshot
    pub async fn resync_item(&self, item: &ContentItem) -> Result<ItemUpdate, ScanError> {
        let key = ItemKey::new(item.owner_id, item.id);
        let lock = Arc::clone(self.item_locks.entry(key).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.resync_locked(key, item).await
        };

        // Drop the entry once no other resync of this item holds or waits on it
        drop(lock);
        self.item_locks.remove_if(&key, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    async fn resync_locked(
        &self,
        key: ItemKey,
        item: &ContentItem,
    ) -> Result<ItemUpdate, ScanError> {
        // Listings may omit the file list; details always carry it
        let detailed;
        let item = if item.files.is_empty() {
            detailed = self.catalog.item(item.id).await?;
            &detailed
        } else {
            item
        };

        // Download into a staging area so a failure leaves the previous files
        let worktree = self.snapshots.worktree(key)?;
        let staging = worktree.stage()?;
        for file in &item.files {
            let path = staging.file_path(&staging.file_name(file.id))?;
            if let Err(e) = self.catalog.download_file(file.id, &path).await {
                warn!(item = %key, file = file.id, error = %e, "download failed, skipping commit");
                return Ok(ItemUpdate {
                    item: item.clone(),
                    snapshot: None,
                    change: ChangeReport::Unavailable {
                        reason: e.to_string(),
                    },
                });
            }
        }

        staging.promote()?;
        let outcome = self.snapshots.commit_worktree(
            key,
            &item.creator,
            &self.config.author_email,
            item.last_updated,
        )?;

        let change = match outcome.summary {
            Some(summary) => ChangeReport::Diff(summary),
            None => ChangeReport::Baseline,
        };
        Ok(ItemUpdate {
            item: item.clone(),
            snapshot: Some(outcome.snapshot),
            change,
        })
    }

    fn mark_for_retry(&self, item: &ContentItem) {
        let key = ItemKey::new(item.owner_id, item.id);
        debug!(item = %key, last_updated = %item.last_updated, "queued for retry");
        self.retry.lock().insert(key);
    }

    /// Pending items newer than the watermark or queued for retry, grouped
    /// by tracked owner
    async fn pending_by_owner(
        &self,
        pass: &mut CatalogPass,
    ) -> Result<BTreeMap<EntityId, Vec<ContentItem>>, ScanError> {
        let tracked: HashSet<EntityId> = self.cursors.tracked_entities()?.into_iter().collect();
        let listing = self.catalog.pending().await?;
        pass.listed = listing.len();

        let watermark = self.watermark();
        let mut retry = self.retry.lock().clone();
        retry.retain(|key| tracked.contains(&key.owner_id));

        let mut newest = watermark;
        let mut seen = HashSet::new();
        let mut groups: BTreeMap<EntityId, Vec<ContentItem>> = BTreeMap::new();

        for item in listing {
            newest = newest.max(item.last_updated);
            let key = ItemKey::new(item.owner_id, item.id);
            seen.insert(key);

            let queued = retry.contains(&key);
            if item.last_updated <= watermark && !queued {
                // Queued retries may sit anywhere in the listing
                if self.config.assume_sorted && retry.is_empty() {
                    break;
                }
                continue;
            }
            if tracked.contains(&item.owner_id) {
                pass.matched += 1;
                groups.entry(item.owner_id).or_default().push(item);
            }
        }

        // The loop only breaks early with nothing queued, so `seen` is the
        // whole listing whenever there is something to prune
        retry.retain(|key| seen.contains(key));
        *self.retry.lock() = retry;

        // Max of the old value and what this pass observed; never regresses
        *self.watermark.lock() = newest;
        Ok(groups)
    }
}

/// Stop signal and join handles of the running loops
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Token that stops both loops when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal both loops and wait for them to finish their current pass
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

/// Tick `pass` every `period` until cancelled
///
/// Cancellation is checked between passes; a running pass completes.
async fn run_periodic<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting {} loop (interval: {:?})", name, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }
        pass().await;
    }

    debug!("{} loop stopped", name);
}
