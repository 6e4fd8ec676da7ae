//! Local snapshot storage.
//!
//! Layout: `<root>/<tier>/<snapshot-name>/...mirrored remote tree...`.
//! A snapshot's creation time is its directory mtime; that timestamp alone
//! orders snapshots for both expiry and eviction.

pub mod quota;
pub mod retention;
pub mod tier;

use crate::config::RetentionPolicy;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

pub use quota::{enforce_quota, QuotaOutcome};
pub use retention::{enforce_retention, is_expired, RetentionOutcome};
pub use tier::{DueWindow, Tier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub tier: Tier,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Elapsed time since creation; zero if the mtime lies in the future
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.created_at).max(chrono::Duration::zero())
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        self.age(now).num_seconds() as f64 / 3600.0
    }

    /// Total size of the files under the snapshot, computed on each call
    pub fn size_bytes(&self) -> Result<u64> {
        dir_size(&self.path)
    }
}

/// Sum of regular file sizes under `root`
pub fn dir_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(std::io::Error::from)?.len();
        }
    }
    Ok(total)
}

/// The tiered backup directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.as_str())
    }

    pub fn snapshot_path<Tz: TimeZone>(&self, tier: Tier, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: fmt::Display,
    {
        self.tier_dir(tier).join(tier.snapshot_name(at))
    }

    /// Create the directory for a snapshot started at `at`
    pub fn create_snapshot<Tz: TimeZone>(&self, tier: Tier, at: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz::Offset: fmt::Display,
    {
        let path = self.snapshot_path(tier, at);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Every snapshot directory across all tiers, oldest first.
    ///
    /// Only immediate subdirectories of each tier directory count; tiers
    /// without a directory are skipped.
    pub fn scan(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();

        for tier in Tier::ALL {
            let tier_dir = self.tier_dir(tier);
            if !tier_dir.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&tier_dir)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if !metadata.is_dir() {
                    continue;
                }
                snapshots.push(Snapshot {
                    tier,
                    path: entry.path(),
                    created_at: metadata.modified()?.into(),
                });
            }
        }

        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
        Ok(snapshots)
    }
}

/// What one cleanup pass removed
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Deleted for exceeding their tier's age limit
    pub expired: Vec<Snapshot>,
    /// Deleted to get under the byte budget
    pub evicted: Vec<Snapshot>,
    pub remaining: usize,
    pub total_bytes: u64,
}

/// Expire old snapshots, then evict the oldest until under quota.
pub fn cleanup(store: &SnapshotStore, now: DateTime<Utc>, policy: &RetentionPolicy) -> Result<CleanupReport> {
    info!(path = %store.root().display(), event = "cleanup_started", "Starting cleanup of old backups");

    let snapshots = store.scan()?;
    let retention = enforce_retention(snapshots, now, policy)?;
    let kept = retention.kept.len();
    let quota = enforce_quota(retention.kept, policy.max_total_bytes)?;

    let report = CleanupReport {
        expired: retention.deleted,
        remaining: kept - quota.deleted.len(),
        evicted: quota.deleted,
        total_bytes: quota.total_bytes,
    };

    info!(
        expired = report.expired.len(),
        evicted = report.evicted.len(),
        remaining = report.remaining,
        total_bytes = report.total_bytes,
        event = "cleanup_finished",
        "Cleanup complete"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};
    use tempfile::TempDir;

    /// A snapshot directory holding one file of `size` bytes
    pub(crate) fn make_snapshot(root: &Path, tier: Tier, name: &str, size: usize, created_at: DateTime<Utc>) -> Snapshot {
        let path = root.join(tier.as_str()).join(name);
        std::fs::create_dir_all(path.join("region")).unwrap();
        std::fs::write(path.join("region/data.bin"), vec![0u8; size]).unwrap();
        Snapshot { tier, path, created_at }
    }

    #[test]
    fn test_create_and_scan() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path());
        let at = FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 16, 0, 0)
            .unwrap();

        let hourly = store.create_snapshot(Tier::Hourly, &at)?;
        let weekly = store.create_snapshot(Tier::Weekly, &at)?;
        std::fs::write(store.tier_dir(Tier::Hourly).join("stray.txt"), "not a snapshot")?;

        assert_eq!(hourly, temp.path().join("hourly/2024-05-01_16.00.00"));
        assert_eq!(weekly, temp.path().join("weekly/2024-05-01"));

        let snapshots = store.scan()?;
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().any(|s| s.tier == Tier::Hourly && s.path == hourly));
        assert!(snapshots.iter().any(|s| s.tier == Tier::Weekly && s.path == weekly));
        Ok(())
    }

    #[test]
    fn test_scan_missing_root() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().join("nothing-here"));
        assert!(store.scan()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_dir_size_is_recursive() -> Result<()> {
        let temp = TempDir::new()?;
        std::fs::create_dir_all(temp.path().join("a/b"))?;
        std::fs::write(temp.path().join("top.bin"), b"12345")?;
        std::fs::write(temp.path().join("a/b/deep.bin"), b"1234567")?;

        assert_eq!(dir_size(temp.path())?, 12);
        Ok(())
    }

    #[test]
    fn test_age_uses_total_elapsed_time() {
        let created = Utc::now() - Duration::days(3) - Duration::hours(2);
        let snapshot = Snapshot {
            tier: Tier::Daily,
            path: PathBuf::from("/unused"),
            created_at: created,
        };
        let now = created + Duration::days(3) + Duration::hours(2);

        assert_eq!(snapshot.age_hours(now), 74.0);
        assert_eq!(snapshot.age(created - Duration::hours(1)), Duration::zero());
    }

    #[test]
    fn test_cleanup_is_idempotent() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path());
        for name in ["a", "b", "c"] {
            make_snapshot(temp.path(), Tier::Hourly, name, 100, Utc::now());
        }
        let policy = RetentionPolicy {
            max_total_bytes: 250,
            ..RetentionPolicy::default()
        };
        let now = Utc::now();

        let first = cleanup(&store, now, &policy)?;
        assert_eq!(first.expired.len(), 0);
        assert_eq!(first.evicted.len(), 1);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.total_bytes, 200);

        let second = cleanup(&store, now, &policy)?;
        assert!(second.expired.is_empty());
        assert!(second.evicted.is_empty());
        assert_eq!(second.remaining, 2);
        Ok(())
    }

    #[test]
    fn test_cleanup_expires_by_directory_mtime() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path());
        make_snapshot(temp.path(), Tier::Hourly, "h", 10, Utc::now());
        make_snapshot(temp.path(), Tier::Daily, "d", 10, Utc::now());

        let now = Utc::now() + Duration::hours(13);
        let report = cleanup(&store, now, &RetentionPolicy::default())?;

        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].tier, Tier::Hourly);
        assert!(!temp.path().join("hourly/h").exists());
        assert!(temp.path().join("daily/d").exists());
        Ok(())
    }
}
