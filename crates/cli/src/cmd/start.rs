//! Run the scheduler in the foreground

use crate::config::Config;
use crate::locks::SchedulerLock;
use crate::notifier::LogNotifier;
use crate::util;
use anyhow::{Context, Result};
use cw_watcher::PollScheduler;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing::info;

pub async fn run(config: &Config) -> Result<()> {
    let data_dir = config.data_dir()?;
    let snapshot_root = config.snapshot_root()?;
    let _lock = SchedulerLock::acquire(&data_dir, &snapshot_root)?;

    let client = util::client(config)?;
    let cursors = util::open_cursors(config)?;
    let snapshots = util::snapshot_store(config)?;
    let tracked = cursors.tracked_entities()?.len();

    let scheduler = Arc::new(PollScheduler::new(
        client.clone(),
        client,
        Arc::clone(&cursors),
        snapshots,
        Arc::new(LogNotifier),
        config.scheduler_config(),
    ));

    println!("{}", "Scheduler running".bold());
    println!("  Data:        {}", data_dir.display().to_string().cyan());
    println!("  Snapshots:   {}", snapshot_root.display().to_string().cyan());
    println!("  Tracking:    {} accounts", tracked);
    println!("  {}", "Ctrl-C to stop".dimmed());

    let handle = scheduler.start();
    shutdown_signal().await.context("Failed to listen for shutdown signals")?;

    info!("shutdown requested");
    handle.stop().await;
    cursors.flush().context("Failed to flush cursor database")?;

    println!("{}", "Scheduler stopped".green());
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
