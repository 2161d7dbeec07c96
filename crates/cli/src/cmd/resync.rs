//! Snapshot one item immediately

use crate::config::Config;
use crate::diff_utils;
use crate::locks::SchedulerLock;
use crate::notifier::LogNotifier;
use crate::util;
use anyhow::{Context, Result};
use cw_watcher::{ChangeReport, PollScheduler};
use owo_colors::OwoColorize;
use std::sync::Arc;

pub async fn run(config: &Config, item_id: u64) -> Result<()> {
    let data_dir = config.data_dir()?;
    let snapshot_root = config.snapshot_root()?;
    let _lock = SchedulerLock::acquire(&data_dir, &snapshot_root)?;

    let client = util::client(config)?;
    let scheduler = PollScheduler::new(
        client.clone(),
        client,
        util::open_cursors(config)?,
        util::snapshot_store(config)?,
        Arc::new(LogNotifier),
        config.scheduler_config(),
    );

    let update = scheduler
        .resync(item_id)
        .await
        .with_context(|| format!("Failed to resync item {}", item_id))?;

    println!(
        "{} - {} ({}/{})",
        update.item.artist.bold(),
        update.item.title.bold(),
        update.item.owner_id,
        update.item.id
    );
    match (&update.snapshot, &update.change) {
        (_, ChangeReport::Unavailable { reason }) => {
            println!("{} {}", "Files unavailable, nothing committed:".yellow(), reason);
        }
        (Some(id), ChangeReport::Baseline) => {
            println!("Snapshot {} {}", id.short().yellow(), "(first snapshot)".dimmed());
        }
        (Some(id), ChangeReport::Diff(summary)) => {
            println!("Snapshot {}", id.short().yellow());
            print!("{}", diff_utils::render_stat(summary));
        }
        (None, _) => {}
    }
    Ok(())
}
