//! Tracked entity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External account identifier
pub type EntityId = u64;

/// Activity feed record identifier
pub type ActivityId = u64;

/// A delivery target interested in an entity's changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    pub id: String,
    /// Higher values are delivered first
    pub priority: u8,
}

/// Stored per-entity state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EntityRecord {
    /// Highest processed activity id
    pub cursor: Option<ActivityId>,
    pub tracked_at: DateTime<Utc>,
}

/// A tracked account with its cursor and observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntity {
    pub id: EntityId,
    pub cursor: Option<ActivityId>,
    pub tracked_at: DateTime<Utc>,
    pub observers: Vec<Observer>,
}
