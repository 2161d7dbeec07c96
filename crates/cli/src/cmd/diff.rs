//! Show what a snapshot changed

use crate::config::Config;
use crate::diff_utils;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(config: &Config, item: &str, snapshot: Option<&str>, stat: bool) -> Result<()> {
    let key = util::parse_item_key(item)?;
    let store = util::snapshot_store(config)?;
    let id = store.resolve(key, snapshot)?;

    if stat {
        let summary = store.diff_summary(key, id)?;
        println!("{} {}", "Snapshot".bold(), id.short().yellow());
        print!("{}", diff_utils::render_stat(&summary));
        return Ok(());
    }

    let patch = store.diff(key, id)?;
    if patch.is_empty() {
        println!("{}", "No changes".dimmed());
    } else {
        print!("{}", diff_utils::colorize_patch(&patch));
    }
    Ok(())
}
