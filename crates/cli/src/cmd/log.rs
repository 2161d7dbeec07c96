//! Show an item's snapshot history

use crate::config::Config;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

const DEFAULT_LIMIT: usize = 20;

pub fn run(config: &Config, item: &str, limit: Option<usize>) -> Result<()> {
    let key = util::parse_item_key(item)?;
    let store = util::snapshot_store(config)?;
    let history = store.history(key, limit.unwrap_or(DEFAULT_LIMIT))?;

    println!("{} {}", "History of".bold(), key.to_string().cyan());
    println!();

    let mut shown = 0;
    for info in &history {
        let info = info?;
        println!(
            "{} {} {}",
            info.id.short().yellow(),
            util::format_absolute_time(info.when),
            format!("({})", info.age).dimmed()
        );
        println!("  {} <{}>", info.author.name, info.author.email);
        println!("  {}", info.message);
        match info.parent {
            Some(parent) => println!("  {}  {}", info.summary, format!("parent {}", parent.short()).dimmed()),
            None => println!("  {}", "first snapshot".dimmed()),
        }
        println!();
        shown += 1;
    }

    if shown == 0 {
        println!("  {}", "No snapshots".dimmed());
    }
    Ok(())
}
