//! Show configuration

use crate::config::{config_file_path, example_config, Config};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(config: &Config, example: bool, path: bool) -> Result<()> {
    if example {
        print!("{}", example_config());
        return Ok(());
    }

    let config_path = config_file_path();
    if path {
        println!("{}", config_path.display());
        if !config_path.exists() {
            println!("{}", "File does not exist. Use --example to get started.".yellow());
        }
        return Ok(());
    }

    let mut shown = config.clone();
    if !shown.api.client_secret.is_empty() {
        shown.api.client_secret = "********".to_string();
    }

    println!("{}", "Effective configuration".bold());
    println!("{}: {}", "Location".dimmed(), config_path.display().dimmed());
    println!("{}: {}", "Data".dimmed(), config.data_dir()?.display().dimmed());
    println!();
    print!("{}", toml::to_string_pretty(&shown).context("Failed to render config")?);
    Ok(())
}
