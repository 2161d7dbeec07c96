//! Tracked-entity and cursor store using sled
//!
//! Layout (one sled tree each):
//! - `entities`:  entity_id(be) -> EntityRecord (bincode)
//! - `observers`: entity_id(be) ++ observer_id -> priority
//! - `observed`:  len(observer_id) ++ observer_id ++ entity_id(be) -> priority

use crate::entity::{ActivityId, EntityId, EntityRecord, Observer, TrackedEntity};
use crate::Result;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Failures of the cursor store
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor store: {0}")]
    Storage(#[from] sled::Error),

    #[error("corrupt record for entity {entity}: {reason}")]
    Corrupt { entity: EntityId, reason: String },

    #[error("entity {0} is not tracked")]
    NotTracked(EntityId),

    #[error("observer id of {0} bytes is too long")]
    ObserverTooLong(usize),

    #[error("failed to encode entity record: {0}")]
    Encode(#[from] bincode::Error),
}

/// Persistent tracked-entity state
pub struct CursorStore {
    db: Db,
    entities: Tree,
    observers: Tree,
    observed: Tree,
}

impl CursorStore {
    /// Open or create a store at the given directory
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path.join("cursors.db"))?;
        let entities = db.open_tree("entities")?;
        let observers = db.open_tree("observers")?;
        let observed = db.open_tree("observed")?;

        Ok(Self {
            db,
            entities,
            observers,
            observed,
        })
    }

    /// Record that `observer` follows `entity`
    ///
    /// Creates the entity on first use (without a cursor) and returns whether
    /// it was newly created. Re-tracking updates the observer's priority.
    pub fn track(&self, entity: EntityId, observer: &str, priority: u8) -> Result<bool> {
        let entity_key = entity.to_be_bytes();
        let record = bincode::serialize(&EntityRecord {
            cursor: None,
            tracked_at: Utc::now(),
        })?;
        let observer_key = observer_key(entity, observer);
        let observed_key = observed_key(observer, entity)?;

        let created = (&self.entities, &self.observers, &self.observed)
            .transaction(|(entities, observers, observed)| {
                let existed = entities.get(&entity_key[..])?.is_some();
                if !existed {
                    entities.insert(&entity_key[..], record.as_slice())?;
                }
                observers.insert(observer_key.as_slice(), &[priority][..])?;
                observed.insert(observed_key.as_slice(), &[priority][..])?;
                Ok::<_, ConflictableTransactionError<()>>(!existed)
            })
            .map_err(|e| transaction_error(entity, e))?;

        self.db.flush()?;
        debug!(entity, observer, priority, created, "tracked entity");
        Ok(created)
    }

    /// Remove the observer relation; the entity and its cursor stay
    pub fn untrack(&self, entity: EntityId, observer: &str) -> Result<bool> {
        let observer_key = observer_key(entity, observer);
        let observed_key = observed_key(observer, entity)?;

        let removed = (&self.observers, &self.observed)
            .transaction(|(observers, observed)| {
                let existed = observers.remove(observer_key.as_slice())?.is_some();
                observed.remove(observed_key.as_slice())?;
                Ok::<_, ConflictableTransactionError<()>>(existed)
            })
            .map_err(|e| transaction_error(entity, e))?;

        self.db.flush()?;
        Ok(removed)
    }

    /// Whether the entity has ever been tracked
    pub fn is_tracked(&self, entity: EntityId) -> Result<bool> {
        Ok(self.entities.contains_key(entity.to_be_bytes())?)
    }

    /// All tracked entity ids in ascending order
    pub fn tracked_entities(&self) -> Result<Vec<EntityId>> {
        let mut ids = Vec::new();
        for item in self.entities.iter() {
            let (key, _) = item?;
            ids.push(decode_entity_id(&key)?);
        }
        Ok(ids)
    }

    /// Full state of one entity
    pub fn entity(&self, entity: EntityId) -> Result<Option<TrackedEntity>> {
        let record = match self.entities.get(entity.to_be_bytes())? {
            Some(bytes) => decode_record(entity, &bytes)?,
            None => return Ok(None),
        };

        Ok(Some(TrackedEntity {
            id: entity,
            cursor: record.cursor,
            tracked_at: record.tracked_at,
            observers: self.observers(entity)?,
        }))
    }

    /// Observers of an entity, highest priority first
    pub fn observers(&self, entity: EntityId) -> Result<Vec<Observer>> {
        let mut observers = Vec::new();
        for item in self.observers.scan_prefix(entity.to_be_bytes()) {
            let (key, value) = item?;
            let id = String::from_utf8(key[8..].to_vec()).map_err(|e| CursorError::Corrupt {
                entity,
                reason: format!("observer id: {}", e),
            })?;
            observers.push(Observer {
                id,
                priority: value.first().copied().unwrap_or_default(),
            });
        }

        observers.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(observers)
    }

    /// Entities followed by one observer, with priorities
    pub fn tracked_by(&self, observer: &str) -> Result<Vec<(EntityId, u8)>> {
        let prefix = observed_prefix(observer)?;
        let mut entities = Vec::new();
        for item in self.observed.scan_prefix(&prefix) {
            let (key, value) = item?;
            let entity = decode_entity_id(&key[prefix.len()..])?;
            entities.push((entity, value.first().copied().unwrap_or_default()));
        }
        Ok(entities)
    }

    /// Highest processed activity id, if any
    pub fn cursor(&self, entity: EntityId) -> Result<Option<ActivityId>> {
        match self.entities.get(entity.to_be_bytes())? {
            Some(bytes) => Ok(decode_record(entity, &bytes)?.cursor),
            None => Ok(None),
        }
    }

    /// Move the cursor forward to `candidate`
    ///
    /// Cursors never move backwards: a candidate at or below the stored value
    /// leaves it untouched. Returns the cursor in effect after the call.
    pub fn advance(&self, entity: EntityId, candidate: ActivityId) -> Result<Option<ActivityId>> {
        let key = entity.to_be_bytes();
        loop {
            let current = self
                .entities
                .get(key)?
                .ok_or(CursorError::NotTracked(entity))?;
            let mut record = decode_record(entity, &current)?;

            if record.cursor.is_some_and(|cursor| cursor >= candidate) {
                return Ok(record.cursor);
            }

            let previous = record.cursor;
            record.cursor = Some(candidate);
            let encoded = bincode::serialize(&record)?;

            if self
                .entities
                .compare_and_swap(key, Some(current), Some(encoded))?
                .is_ok()
            {
                self.db.flush()?;
                debug!(entity, ?previous, cursor = candidate, "advanced cursor");
                return Ok(Some(candidate));
            }
            // Lost a race with another writer; re-read and retry
        }
    }

    /// Overwrite the cursor, bypassing the monotonic check
    ///
    /// Only meant for operator resets; `None` makes the next sync a first sync.
    pub fn set_cursor(&self, entity: EntityId, cursor: Option<ActivityId>) -> Result<()> {
        let key = entity.to_be_bytes();
        let current = self
            .entities
            .get(key)?
            .ok_or(CursorError::NotTracked(entity))?;
        let mut record = decode_record(entity, &current)?;
        record.cursor = cursor;
        self.entities.insert(key, bincode::serialize(&record)?)?;
        self.db.flush()?;
        debug!(entity, ?cursor, "reset cursor");
        Ok(())
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn observer_key(entity: EntityId, observer: &str) -> Vec<u8> {
    let mut key = entity.to_be_bytes().to_vec();
    key.extend_from_slice(observer.as_bytes());
    key
}

fn observed_prefix(observer: &str) -> Result<Vec<u8>> {
    let len =
        u16::try_from(observer.len()).map_err(|_| CursorError::ObserverTooLong(observer.len()))?;
    let mut key = len.to_be_bytes().to_vec();
    key.extend_from_slice(observer.as_bytes());
    Ok(key)
}

fn observed_key(observer: &str, entity: EntityId) -> Result<Vec<u8>> {
    let mut key = observed_prefix(observer)?;
    key.extend_from_slice(&entity.to_be_bytes());
    Ok(key)
}

fn decode_entity_id(bytes: &[u8]) -> Result<EntityId> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| CursorError::Corrupt {
        entity: 0,
        reason: format!("entity key has {} bytes", bytes.len()),
    })?;
    Ok(EntityId::from_be_bytes(array))
}

fn decode_record(entity: EntityId, bytes: &[u8]) -> Result<EntityRecord> {
    bincode::deserialize(bytes).map_err(|e| CursorError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

fn transaction_error(entity: EntityId, err: TransactionError<()>) -> CursorError {
    match err {
        TransactionError::Storage(e) => CursorError::Storage(e),
        TransactionError::Abort(()) => CursorError::Corrupt {
            entity,
            reason: "transaction aborted".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, CursorStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CursorStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_track_creates_entity_once() {
        let (_dir, store) = open_store();

        assert!(store.track(7, "channel-a", 3).unwrap());
        assert!(!store.track(7, "channel-b", 1).unwrap());

        assert!(store.is_tracked(7).unwrap());
        assert_eq!(store.tracked_entities().unwrap(), vec![7]);
        assert_eq!(store.cursor(7).unwrap(), None);
    }

    #[test]
    fn test_observers_sorted_by_priority() {
        let (_dir, store) = open_store();
        store.track(7, "low", 1).unwrap();
        store.track(7, "high", 5).unwrap();

        let observers = store.observers(7).unwrap();
        assert_eq!(observers[0].id, "high");
        assert_eq!(observers[1].id, "low");
    }

    #[test]
    fn test_tracked_by_lists_entities() {
        let (_dir, store) = open_store();
        store.track(1, "chan", 3).unwrap();
        store.track(2, "chan", 4).unwrap();
        store.track(3, "chan-other", 3).unwrap();

        assert_eq!(store.tracked_by("chan").unwrap(), vec![(1, 3), (2, 4)]);
    }

    #[test]
    fn test_overlong_observer_is_rejected() {
        let (_dir, store) = open_store();
        let observer = "o".repeat(u16::MAX as usize + 1);

        assert!(matches!(
            store.track(4, &observer, 3),
            Err(CursorError::ObserverTooLong(len)) if len == observer.len()
        ));
        assert!(!store.is_tracked(4).unwrap());
        assert!(store.tracked_by(&observer).is_err());
        assert!(store.untrack(4, &observer).is_err());
    }

    #[test]
    fn test_untrack_keeps_entity() {
        let (_dir, store) = open_store();
        store.track(9, "chan", 3).unwrap();
        store.advance(9, 50).unwrap();

        assert!(store.untrack(9, "chan").unwrap());
        assert!(!store.untrack(9, "chan").unwrap());
        assert!(store.observers(9).unwrap().is_empty());
        assert!(store.tracked_by("chan").unwrap().is_empty());
        assert_eq!(store.cursor(9).unwrap(), Some(50));
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let (_dir, store) = open_store();
        store.track(1, "chan", 3).unwrap();

        assert_eq!(store.advance(1, 100).unwrap(), Some(100));
        assert_eq!(store.advance(1, 90).unwrap(), Some(100));
        assert_eq!(store.advance(1, 100).unwrap(), Some(100));
        assert_eq!(store.advance(1, 105).unwrap(), Some(105));
        assert_eq!(store.cursor(1).unwrap(), Some(105));
    }

    #[test]
    fn test_set_cursor_can_clear() {
        let (_dir, store) = open_store();
        store.track(1, "chan", 3).unwrap();
        store.advance(1, 100).unwrap();

        store.set_cursor(1, None).unwrap();
        assert_eq!(store.cursor(1).unwrap(), None);
        assert_eq!(store.advance(1, 5).unwrap(), Some(5));
    }

    #[test]
    fn test_advance_untracked_fails() {
        let (_dir, store) = open_store();
        assert!(matches!(store.advance(404, 1), Err(CursorError::NotTracked(404))));
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let store = CursorStore::open(temp_dir.path()).unwrap();
            store.track(11, "chan", 2).unwrap();
            store.advance(11, 1234).unwrap();
        }

        let store = CursorStore::open(temp_dir.path()).unwrap();
        let entity = store.entity(11).unwrap().unwrap();
        assert_eq!(entity.cursor, Some(1234));
        assert_eq!(entity.observers, vec![Observer { id: "chan".to_string(), priority: 2 }]);
    }
}
