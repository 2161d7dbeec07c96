//! Start following an account

use crate::config::Config;
use crate::util;
use anyhow::{Context, Result};
use cw_watcher::track_entity;
use owo_colors::OwoColorize;

pub async fn run(config: &Config, account: &str, observer: &str, priority: u8) -> Result<()> {
    let client = util::client(config)?;
    let entity = util::resolve_entity(&client, account).await?;
    let cursors = util::open_cursors(config)?;

    let outcome = track_entity(&cursors, &*client, entity, observer, priority)
        .await
        .with_context(|| format!("Failed to track account {}", entity))?;
    cursors.flush()?;

    if outcome.created {
        println!("{} Tracking account {}", "✓".green(), entity.to_string().cyan());
    } else {
        println!(
            "{} Account {} already tracked; added observer {}",
            "✓".green(),
            entity.to_string().cyan(),
            observer
        );
    }
    match outcome.cursor {
        Some(cursor) => println!("  Cursor:      {}", cursor),
        None => println!("  {}", "No activity yet; first sync seeds the cursor".dimmed()),
    }
    Ok(())
}
