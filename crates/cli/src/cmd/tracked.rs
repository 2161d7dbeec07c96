//! List tracked accounts

use crate::config::Config;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(config: &Config, observer: Option<&str>) -> Result<()> {
    let cursors = util::open_cursors(config)?;

    if let Some(observer) = observer {
        let followed = cursors.tracked_by(observer)?;
        println!("{} {}", "Followed by".bold(), observer.cyan());
        if followed.is_empty() {
            println!("  {}", "Nothing".dimmed());
        }
        for (entity, priority) in followed {
            println!("  {:<12} priority {}", entity, priority);
        }
        return Ok(());
    }

    let entities = cursors.tracked_entities()?;
    println!("{}", "Tracked accounts".bold());
    if entities.is_empty() {
        println!("  {}", "None yet. Add one with 'cw track <account>'".dimmed());
        return Ok(());
    }

    for id in entities {
        let Some(entity) = cursors.entity(id)? else {
            continue;
        };
        let cursor = entity
            .cursor
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let observers: Vec<String> = entity
            .observers
            .iter()
            .map(|o| format!("{}({})", o.id, o.priority))
            .collect();
        println!(
            "  {:<12} cursor {:<14} {}  {}",
            id.to_string().cyan(),
            cursor,
            observers.join(", "),
            format!("since {}", util::format_absolute_time(entity.tracked_at)).dimmed()
        );
    }
    Ok(())
}
