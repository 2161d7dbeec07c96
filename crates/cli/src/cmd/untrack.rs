//! Stop following an account

use crate::config::Config;
use crate::util;
use anyhow::Result;
use cw_watcher::untrack_entity;
use owo_colors::OwoColorize;

pub fn run(config: &Config, entity: u64, observer: &str) -> Result<()> {
    let cursors = util::open_cursors(config)?;

    if untrack_entity(&cursors, entity, observer)? {
        cursors.flush()?;
        println!("{} {} no longer follows {}", "✓".green(), observer, entity);
    } else {
        println!("{}", format!("{} was not following {}", observer, entity).yellow());
    }
    Ok(())
}
