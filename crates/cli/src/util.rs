//! Shared utilities for CLI commands

use crate::config::Config;
use crate::locks::SchedulerLock;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use cw_catalog::RateLimitedClient;
use cw_journal::{CursorStore, EntityId};
use cw_snapshot::{ItemKey, SnapshotStore};
use std::sync::Arc;

/// Open the cursor database under the data directory
pub fn open_cursors(config: &Config) -> Result<Arc<CursorStore>> {
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    match CursorStore::open(&data_dir) {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) => {
            // sled keeps the database locked while a scheduler runs
            if let Ok(Some(owner)) = SchedulerLock::owner(&data_dir) {
                bail!(
                    "Cursor database is in use by the scheduler (pid {}); stop it first: {}",
                    owner.pid,
                    e
                );
            }
            Err(e).context("Failed to open cursor database")
        }
    }
}

pub fn snapshot_store(config: &Config) -> Result<SnapshotStore> {
    let root = config.snapshot_root()?;
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create snapshot root {}", root.display()))?;
    Ok(SnapshotStore::new(root, config.snapshot.file_suffix.clone()))
}

pub fn client(config: &Config) -> Result<Arc<RateLimitedClient>> {
    let client = RateLimitedClient::new(config.client_config()?)
        .context("Failed to build catalog client")?;
    Ok(Arc::new(client))
}

/// Resolve a numeric id or an account name to an entity id
pub async fn resolve_entity(client: &RateLimitedClient, reference: &str) -> Result<EntityId> {
    if let Ok(id) = reference.parse::<EntityId>() {
        return Ok(id);
    }
    let account = client
        .account(reference)
        .await
        .with_context(|| format!("Unknown account '{}'", reference))?;
    Ok(account.id)
}

/// Parse `<owner>/<item>`
pub fn parse_item_key(reference: &str) -> Result<ItemKey> {
    let (owner, item) = reference
        .split_once('/')
        .with_context(|| format!("Expected <owner>/<item>, got '{}'", reference))?;
    let owner = owner
        .parse()
        .with_context(|| format!("Invalid owner id '{}'", owner))?;
    let item = item
        .parse()
        .with_context(|| format!("Invalid item id '{}'", item))?;
    Ok(ItemKey::new(owner, item))
}

/// Format as "2024-01-03 14:30:00 UTC"
pub fn format_absolute_time(when: DateTime<Utc>) -> String {
    when.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_item_key() {
        assert_eq!(parse_item_key("12/345").unwrap(), ItemKey::new(12, 345));
        assert!(parse_item_key("12").is_err());
        assert!(parse_item_key("a/345").is_err());
        assert!(parse_item_key("12/").is_err());
    }

    #[test]
    fn test_format_absolute_time() {
        let when = Utc.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap();
        assert_eq!(format_absolute_time(when), "2024-01-03 14:30:00 UTC");
    }

    #[test]
    fn test_open_stores_create_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().join("data"));

        let cursors = open_cursors(&config).unwrap();
        assert!(cursors.tracked_entities().unwrap().is_empty());

        let store = snapshot_store(&config).unwrap();
        assert_eq!(store.root(), dir.path().join("data").join("snapshots"));
        assert!(store.root().is_dir());
    }
}
