//! Export a snapshot as a zip archive

use crate::config::Config;
use crate::util;
use anyhow::{Context, Result};
use cw_snapshot::SnapshotStore;
use owo_colors::OwoColorize;
use std::fs::File;
use std::path::PathBuf;

pub fn run(config: &Config, item: &str, snapshot: Option<&str>, output: Option<PathBuf>) -> Result<()> {
    let key = util::parse_item_key(item)?;
    let store = util::snapshot_store(config)?;
    let id = store.resolve(key, snapshot)?;

    let dir = output.unwrap_or_else(|| PathBuf::from("."));
    let path = dir.join(SnapshotStore::archive_name(key, id));
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    store.archive(key, id, file)?;

    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}
