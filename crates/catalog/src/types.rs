//! Wire types of the catalog API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity types that announce new or changed content
pub const INTERESTING_ACTIVITY: [&str; 3] = ["contentUpload", "contentRevive", "contentUpdate"];

/// One downloadable file of a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFile {
    pub id: u64,
    #[serde(default)]
    pub version: String,
}

/// A catalog entry; always re-fetched, never stored on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    pub owner_id: u64,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub files: Vec<ItemFile>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Account as returned by the lookup endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub username: String,
}

/// Entry of an account's activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    /// Everything else the feed sent along
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl ActivityRecord {
    pub fn is_interesting(&self) -> bool {
        INTERESTING_ACTIVITY.contains(&self.kind.as_str())
    }
}

/// One page of an activity feed
///
/// `fetched` counts raw records including malformed ones that were skipped,
/// so pagination offsets stay aligned with the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityPage {
    pub records: Vec<ActivityRecord>,
    pub fetched: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_record_keeps_payload() {
        let record: ActivityRecord = serde_json::from_value(json!({
            "id": 42,
            "type": "contentUpdate",
            "created_at": "2024-03-01T12:00:00Z",
            "item": { "title": "Song" }
        }))
        .unwrap();

        assert_eq!(record.id, 42);
        assert!(record.is_interesting());
        assert_eq!(record.payload["item"]["title"], "Song");
    }

    #[test]
    fn test_uninteresting_kinds() {
        let record: ActivityRecord = serde_json::from_value(json!({
            "id": 1,
            "type": "achievement",
            "created_at": "2024-03-01T12:00:00Z"
        }))
        .unwrap();
        assert!(!record.is_interesting());
    }

    #[test]
    fn test_content_item_defaults() {
        let item: ContentItem = serde_json::from_value(json!({
            "id": 9,
            "owner_id": 3,
            "last_updated": "2024-03-01T12:00:00+00:00"
        }))
        .unwrap();
        assert!(item.files.is_empty());
        assert_eq!(item.owner_id, 3);
    }
}
