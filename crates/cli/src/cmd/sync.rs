//! One-off incremental activity sync

use crate::config::Config;
use crate::util;
use anyhow::{Context, Result};
use cw_watcher::IncrementalSynchronizer;
use owo_colors::OwoColorize;
use std::sync::Arc;

pub async fn run(config: &Config, entity: u64, reset: bool) -> Result<()> {
    let client = util::client(config)?;
    let cursors = util::open_cursors(config)?;

    if reset {
        cursors
            .set_cursor(entity, None)
            .with_context(|| format!("Failed to reset cursor of {}", entity))?;
        println!("{} Cursor of {} cleared", "✓".green(), entity);
    }

    let synchronizer = IncrementalSynchronizer::new(client, Arc::clone(&cursors), config.scheduler.page_size);
    let outcome = synchronizer.sync(entity).await?;
    cursors.flush()?;

    if outcome.first_sync {
        println!("{}", format!("First sync of {}; older history is not replayed", entity).dimmed());
    }

    if outcome.activities.is_empty() {
        println!("{}", "No new activity".dimmed());
    }
    for activity in &outcome.activities {
        println!(
            "  {} {} {}",
            activity.id.to_string().yellow(),
            activity.kind,
            util::format_absolute_time(activity.created_at).dimmed()
        );
    }
    if outcome.new_cursor != outcome.previous {
        println!(
            "Cursor {} -> {}",
            outcome.previous.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            outcome.new_cursor.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}
