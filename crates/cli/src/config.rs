//! `catwatch.toml` loading
//!
//! Resolution order:
//! 1. `--config <path>` (must exist)
//! 2. `CATWATCH_CONFIG` environment variable
//! 3. `<config dir>/catwatch/catwatch.toml`
//!
//! A missing default file means defaults for everything.

use anyhow::{bail, Context, Result};
use cw_catalog::{ClientConfig, Credentials};
use cw_watcher::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "CATWATCH_CONFIG";
pub const DEFAULT_CONFIG_FILENAME: &str = "catwatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerSection,
    pub snapshot: SnapshotSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    /// Permits per cool-down window; keep below the provider's quota
    pub requests_per_minute: u32,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://osu.ppy.sh/api/v2".to_string(),
            token_url: "https://osu.ppy.sh/oauth/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "public".to_string(),
            requests_per_minute: 1000,
            cooldown_secs: 60,
            timeout_secs: 9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cursor database and lock files
    pub data_dir: Option<PathBuf>,
    /// Per-item snapshot histories; defaults to `<data_dir>/snapshots`
    pub snapshot_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub catalog_interval_secs: u64,
    pub activity_interval_secs: u64,
    pub page_size: usize,
    pub assume_sorted: bool,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            catalog_interval_secs: 30,
            activity_interval_secs: 60,
            page_size: 50,
            assume_sorted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    pub file_suffix: String,
    pub author_email: String,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            file_suffix: "osu".to_string(),
            author_email: "nobody@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Daily-rolling log files go here when set
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl Config {
    /// Load from an explicit path or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("api.requests_per_minute", self.api.requests_per_minute as u64, 1, 10_000)?;
        check_range("api.cooldown_secs", self.api.cooldown_secs, 1, 3600)?;
        check_range("api.timeout_secs", self.api.timeout_secs, 1, 300)?;
        check_range(
            "scheduler.catalog_interval_secs",
            self.scheduler.catalog_interval_secs,
            5,
            3600,
        )?;
        check_range(
            "scheduler.activity_interval_secs",
            self.scheduler.activity_interval_secs,
            5,
            3600,
        )?;
        check_range("scheduler.page_size", self.scheduler.page_size as u64, 1, 100)?;

        if self.snapshot.file_suffix.is_empty() || self.snapshot.file_suffix.contains(&['/', '.'][..]) {
            bail!(
                "snapshot.file_suffix must be a bare extension, got '{}'",
                self.snapshot.file_suffix
            );
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("catwatch"))
            .context("Could not determine data directory; set storage.data_dir")
    }

    pub fn snapshot_root(&self) -> Result<PathBuf> {
        match &self.storage.snapshot_root {
            Some(root) => Ok(root.clone()),
            None => Ok(self.data_dir()?.join("snapshots")),
        }
    }

    /// Client settings; fails when credentials are missing
    pub fn client_config(&self) -> Result<ClientConfig> {
        if self.api.client_id.is_empty() || self.api.client_secret.is_empty() {
            bail!("api.client_id and api.client_secret must be set to talk to the catalog");
        }
        Ok(ClientConfig {
            base_url: self.api.base_url.clone(),
            credentials: Credentials {
                token_url: self.api.token_url.clone(),
                client_id: self.api.client_id.clone(),
                client_secret: self.api.client_secret.clone(),
                scope: self.api.scope.clone(),
            },
            requests_per_window: self.api.requests_per_minute,
            cooldown: Duration::from_secs(self.api.cooldown_secs),
            timeout: Duration::from_secs(self.api.timeout_secs),
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            catalog_interval: Duration::from_secs(self.scheduler.catalog_interval_secs),
            activity_interval: Duration::from_secs(self.scheduler.activity_interval_secs),
            page_size: self.scheduler.page_size,
            assume_sorted: self.scheduler.assume_sorted,
            author_email: self.snapshot.author_email.clone(),
        }
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        bail!("{} must be between {} and {}, got {}", key, min, max, value);
    }
    Ok(())
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|dir| dir.join("catwatch").join(DEFAULT_CONFIG_FILENAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME))
}

pub fn example_config() -> &'static str {
    r#"# catwatch configuration

[api]
base_url = "https://osu.ppy.sh/api/v2"
token_url = "https://osu.ppy.sh/oauth/token"
client_id = "12345"
client_secret = "change-me"
scope = "public"
# Permits per cool-down window (provider quota is 1200/min)
requests_per_minute = 1000   # 1-10,000
cooldown_secs = 60           # 1-3600
timeout_secs = 9

[storage]
# data_dir = "/var/lib/catwatch"
# snapshot_root = "/var/lib/catwatch/snapshots"

[scheduler]
catalog_interval_secs = 30   # 5-3600
activity_interval_secs = 60  # 5-3600
page_size = 50               # 1-100
# Stop the pending scan at the first item older than the watermark
assume_sorted = false

[snapshot]
file_suffix = "osu"
author_email = "nobody@localhost"

[logging]
level = "info"
# dir = "/var/log/catwatch"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api.requests_per_minute, 1000);
        assert_eq!(config.scheduler.page_size, 50);
        assert_eq!(config.snapshot.file_suffix, "osu");
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(example_config()).unwrap();
        assert_eq!(config.api.client_id, "12345");
        assert_eq!(config.scheduler.catalog_interval_secs, 30);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::parse("[scheduler]\npage_size = 20\n").unwrap();
        assert_eq!(config.scheduler.page_size, 20);
        assert_eq!(config.scheduler.activity_interval_secs, 60);
        assert_eq!(config.api.cooldown_secs, 60);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = Config::parse("[scheduler]\npage_size = 500\n").unwrap_err();
        assert!(format!("{:#}", err).contains("scheduler.page_size"));

        assert!(Config::parse("[api]\nrequests_per_minute = 0\n").is_err());
        assert!(Config::parse("[scheduler]\ncatalog_interval_secs = 1\n").is_err());
        assert!(Config::parse("[snapshot]\nfile_suffix = \"a/b\"\n").is_err());
    }

    #[test]
    fn test_snapshot_root_defaults_under_data_dir() {
        let config = Config::parse("[storage]\ndata_dir = \"/tmp/cw\"\n").unwrap();
        assert_eq!(config.snapshot_root().unwrap(), PathBuf::from("/tmp/cw/snapshots"));
    }

    #[test]
    fn test_client_config_requires_credentials() {
        assert!(Config::default().client_config().is_err());

        let mut config = Config::default();
        config.api.client_id = "id".to_string();
        config.api.client_secret = "secret".to_string();
        let client = config.client_config().unwrap();
        assert_eq!(client.requests_per_window, 1000);
        assert_eq!(client.cooldown, Duration::from_secs(60));
        assert_eq!(client.credentials.scope, "public");
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());

        let path = dir.path().join("cw.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().logging.level, "debug");
    }
}
