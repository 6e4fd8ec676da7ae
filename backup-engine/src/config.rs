//! Configuration for the backup engine.
//!
//! Loads from a TOML file; every section and field has a default so a
//! partial file is valid.

use crate::snapshot::Tier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// SFTP host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// SFTP port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Remote directory mirrored into every snapshot
    #[serde(default = "default_root")]
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of download workers, each with its own connection
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long a worker waits on an empty queue before re-checking
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
}

/// Per-tier age limits and the global byte budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_hourly_hours")]
    pub hourly_max_age_hours: u64,

    #[serde(default = "default_daily_hours")]
    pub daily_max_age_hours: u64,

    #[serde(default = "default_weekly_hours")]
    pub weekly_max_age_hours: u64,

    /// Total size allowed across every tier's snapshots
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root holding one directory per tier
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

// Default values
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_root() -> String {
    "/world".to_string()
}

fn default_workers() -> usize {
    16
}

fn default_queue_timeout_secs() -> u64 {
    5
}

fn default_hourly_hours() -> u64 {
    12
}

fn default_daily_hours() -> u64 {
    3 * 24
}

fn default_weekly_hours() -> u64 {
    2 * 7 * 24
}

fn default_max_total_bytes() -> u64 {
    14 * 1024 * 1024 * 1024 // 14 GiB
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("./backups")
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            root: default_root(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_timeout_secs: default_queue_timeout_secs(),
        }
    }
}

impl PoolConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            hourly_max_age_hours: default_hourly_hours(),
            daily_max_age_hours: default_daily_hours(),
            weekly_max_age_hours: default_weekly_hours(),
            max_total_bytes: default_max_total_bytes(),
        }
    }
}

impl RetentionPolicy {
    pub fn max_age_hours(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Hourly => self.hourly_max_age_hours,
            Tier::Daily => self.daily_max_age_hours,
            Tier::Weekly => self.weekly_max_age_hours,
        }
    }

    /// Age past which a snapshot of `tier` is deleted
    pub fn max_age(&self, tier: Tier) -> chrono::Duration {
        i64::try_from(self.max_age_hours(tier))
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backups_dir: default_backups_dir(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.pool.workers == 0 {
            return Err(crate::EngineError::Config("pool.workers must be at least 1".into()));
        }
        if self.remote.root.is_empty() {
            return Err(crate::EngineError::Config("remote.root must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.remote.root, "/world");
        assert_eq!(config.pool.workers, 16);
        assert_eq!(config.pool.queue_timeout(), Duration::from_secs(5));
        assert_eq!(config.retention.max_age_hours(Tier::Hourly), 12);
        assert_eq!(config.retention.max_age_hours(Tier::Daily), 72);
        assert_eq!(config.retention.max_age_hours(Tier::Weekly), 336);
        assert_eq!(config.retention.max_total_bytes, 14 * 1024u64.pow(3));
    }

    #[test]
    fn test_partial_toml() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
[remote]
host = "mc.example.net"
port = 2022
username = "backup"

[pool]
workers = 4

[retention]
hourly_max_age_hours = 6
"#,
        )?;

        let config = EngineConfig::from_file(&path)?;
        assert_eq!(config.remote.host, "mc.example.net");
        assert_eq!(config.remote.port, 2022);
        assert_eq!(config.remote.root, "/world");
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.pool.queue_timeout_secs, 5);
        assert_eq!(config.retention.hourly_max_age_hours, 6);
        assert_eq!(config.retention.daily_max_age_hours, 72);
        assert_eq!(config.storage.backups_dir, PathBuf::from("./backups"));
        Ok(())
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.pool.workers = 0;
        assert!(config.validate().is_err());
    }
}
