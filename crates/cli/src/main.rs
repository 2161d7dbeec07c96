//! Catwatch CLI - cw command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod cmd;
mod config;
mod diff_utils;
mod locks;
mod notifier;
mod util;

use config::Config;

/// Catwatch - follow catalog accounts and keep versioned item histories
#[derive(Parser)]
#[command(name = "cw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/catwatch/catwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily-rolling log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the catalog and activity scans until interrupted
    Start,
    /// Start following an account
    Track {
        /// Account id or name
        account: String,
        /// Who gets notified
        #[arg(short, long, default_value = "cli")]
        observer: String,
        /// Delivery priority (higher first)
        #[arg(short, long, default_value_t = cw_watcher::DEFAULT_PRIORITY)]
        priority: u8,
    },
    /// Stop following an account
    Untrack {
        /// Account id
        entity: u64,
        #[arg(short, long, default_value = "cli")]
        observer: String,
    },
    /// List tracked accounts with their cursors
    Tracked {
        /// Only accounts followed by this observer
        #[arg(short, long)]
        observer: Option<String>,
    },
    /// Run one incremental activity sync now
    Sync {
        /// Account id
        entity: u64,
        /// Forget the cursor first (next sync only re-seeds it)
        #[arg(long)]
        reset: bool,
    },
    /// Download an item's files and commit a snapshot now
    Resync {
        /// Item id
        item: u64,
    },
    /// Show an item's snapshot history
    Log {
        /// Item as <owner>/<item>
        item: String,
        /// Number of snapshots to show (default: 20)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the patch of a snapshot against its parent
    Diff {
        /// Item as <owner>/<item>
        item: String,
        /// Snapshot id or unique prefix (default: newest)
        snapshot: Option<String>,
        /// Only list changed files
        #[arg(long)]
        stat: bool,
    },
    /// Export a snapshot as a zip archive
    Archive {
        /// Item as <owner>/<item>
        item: String,
        /// Snapshot id or unique prefix (default: newest)
        snapshot: Option<String>,
        /// Output directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show configuration
    Config {
        /// Print an example config file
        #[arg(long)]
        example: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let log_dir = cli.log_dir.clone().or_else(|| config.logging.dir.clone());
    let _guard = init_logging(&config.logging.level, log_dir)?;

    match cli.command {
        Commands::Start => cmd::start::run(&config).await,
        Commands::Track {
            account,
            observer,
            priority,
        } => cmd::track::run(&config, &account, &observer, priority).await,
        Commands::Untrack { entity, observer } => cmd::untrack::run(&config, entity, &observer),
        Commands::Tracked { observer } => cmd::tracked::run(&config, observer.as_deref()),
        Commands::Sync { entity, reset } => cmd::sync::run(&config, entity, reset).await,
        Commands::Resync { item } => cmd::resync::run(&config, item).await,
        Commands::Log { item, limit } => cmd::log::run(&config, &item, limit),
        Commands::Diff {
            item,
            snapshot,
            stat,
        } => cmd::diff::run(&config, &item, snapshot.as_deref(), stat),
        Commands::Archive {
            item,
            snapshot,
            output,
        } => cmd::archive::run(&config, &item, snapshot.as_deref(), output),
        Commands::Config { example, path } => cmd::config::run(&config, example, path),
    }
}

/// Stderr subscriber filtered by `RUST_LOG` (falling back to `level`), plus
/// an optional daily-rolling file whose writer guard must outlive `main`
fn init_logging(level: &str, log_dir: Option<PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(dir, "catwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
