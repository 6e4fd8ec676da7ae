use crate::state::AppState;
use backup_engine::snapshot::{cleanup, CleanupReport};
use backup_engine::{run_backup, Tier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tier: Tier,
    pub path: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_enqueued: usize,
    pub files_fetched: u64,
    pub files_failed: u64,
    pub bytes: u64,
    pub error: Option<String>,
    pub expired: usize,
    pub evicted: usize,
}

/// Back up one tier into a fresh snapshot, then clean up.
///
/// Scheduled triggers outside the tier's due window are skipped and return
/// `None`, as is any trigger once shutdown has begun. Runs are serialized on
/// the state's run lock.
pub async fn run_tier(state: Arc<AppState>, tier: Tier, trigger: Trigger) -> anyhow::Result<Option<RunSummary>> {
    if trigger == Trigger::Scheduled && !tier.is_due(&state.config.local_now(), &state.config.due_window) {
        let reason = match tier {
            Tier::Hourly => "outside active hours",
            Tier::Weekly => "not the weekly backup day",
            Tier::Daily => "not due",
        };
        tracing::info!(tier = %tier, event = "backup_skipped", reason, "{} backup skipped", tier);
        return Ok(None);
    }

    if state.shutdown.is_cancelled() {
        tracing::info!(tier = %tier, event = "backup_skipped", reason = "shutting down", "{} backup skipped", tier);
        return Ok(None);
    }

    let _guard = match state.run_lock.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            tracing::info!(tier = %tier, "Another backup is running, waiting for it to finish");
            state.run_lock.lock().await
        }
    };

    // shutdown may have begun while waiting for the lock
    if state.shutdown.is_cancelled() {
        tracing::info!(tier = %tier, event = "backup_skipped", reason = "shutting down", "{} backup skipped", tier);
        return Ok(None);
    }

    let local_now = state.config.local_now();
    let path = state.store.create_snapshot(tier, &local_now)?;
    let path_str = path.display().to_string();
    tracing::info!(tier = %tier, path = %path_str, event = "backup_started", "Starting {} backup to {}", tier, path_str);

    let started_at = Utc::now();
    let remote = state.remote.clone();
    let remote_root = state.config.engine.remote.root.clone();
    let pool = state.config.engine.pool.clone();
    let destination = path.clone();
    let span = tracing::info_span!("backup", tier = %tier);
    let result = tokio::task::spawn_blocking(move || {
        span.in_scope(|| run_backup(&*remote, &remote_root, &destination, &pool))
    })
    .await?;

    let mut summary = RunSummary {
        tier,
        path: path_str.clone(),
        status: RunStatus::Finished,
        started_at,
        finished_at: Utc::now(),
        files_enqueued: 0,
        files_fetched: 0,
        files_failed: 0,
        bytes: 0,
        error: None,
        expired: 0,
        evicted: 0,
    };

    match result {
        Ok(report) => {
            summary.files_enqueued = report.jobs_enqueued();
            summary.files_fetched = report.pool.fetched;
            summary.files_failed = report.pool.failed;
            summary.bytes = report.pool.bytes;
            tracing::info!(
                tier = %tier,
                path = %path_str,
                event = "backup_finished",
                fetched = report.pool.fetched,
                failed = report.pool.failed,
                "Finished {} backup",
                tier
            );
        }
        Err(e) => {
            summary.status = RunStatus::Failed;
            summary.error = Some(e.to_string());
            tracing::error!(tier = %tier, path = %path_str, event = "backup_failed", reason = %e, "{} backup failed", tier);
        }
    }

    match cleanup_pass(&state).await {
        Ok(report) => {
            summary.expired = report.expired.len();
            summary.evicted = report.evicted.len();
        }
        Err(e) => {
            tracing::error!(tier = %tier, event = "cleanup_failed", reason = %e, "Cleanup failed");
        }
    }

    state.last_runs.write().await.insert(tier, summary.clone());
    Ok(Some(summary))
}

/// One retention and quota pass, serialized with backup runs
pub async fn run_cleanup(state: &Arc<AppState>) -> anyhow::Result<CleanupReport> {
    let _guard = state.run_lock.lock().await;
    cleanup_pass(state).await
}

async fn cleanup_pass(state: &Arc<AppState>) -> anyhow::Result<CleanupReport> {
    let state = state.clone();
    let report = tokio::task::spawn_blocking(move || {
        cleanup(&state.store, Utc::now(), &state.config.engine.retention)
    })
    .await??;
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AppConfig;
    use backup_engine::remote::MemoryRemote;
    use backup_engine::utils::LogRing;
    use chrono::Datelike;
    use tempfile::TempDir;

    pub(crate) fn test_state(temp: &TempDir, remote: MemoryRemote) -> Arc<AppState> {
        let mut config = AppConfig::from_vars(|_| None);
        config.engine.storage.backups_dir = temp.path().to_path_buf();
        config.engine.pool.workers = 2;
        config.engine.pool.queue_timeout_secs = 1;
        Arc::new(AppState::new(config, LogRing::new(50), Arc::new(remote)))
    }

    fn world() -> MemoryRemote {
        let remote = MemoryRemote::new();
        remote
            .add_file("/world/level.dat", "level")
            .add_file("/world/region/r.0.0.mca", "region");
        remote
    }

    #[tokio::test]
    async fn test_manual_run_creates_snapshot() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let state = test_state(&temp, world());

        let summary = run_tier(state.clone(), Tier::Daily, Trigger::Manual)
            .await?
            .expect("manual runs are never skipped");

        assert_eq!(summary.status, RunStatus::Finished);
        assert_eq!(summary.files_fetched, 2);
        assert_eq!(summary.files_failed, 0);

        let snapshots = state.store.scan()?;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].tier, Tier::Daily);
        assert!(snapshots[0].path.join("region/r.0.0.mca").is_file());
        assert!(state.last_runs.read().await.contains_key(&Tier::Daily));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_walk_is_recorded() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let remote = world();
        remote.refuse_connects(1);
        let state = test_state(&temp, remote);

        let summary = run_tier(state, Tier::Hourly, Trigger::Manual).await?.expect("not skipped");

        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_scheduled_run_outside_window_is_skipped() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let remote = world();
        let mut config = AppConfig::from_vars(|_| None);
        config.engine.storage.backups_dir = temp.path().to_path_buf();
        config.due_window.weekly_day = config.local_now().weekday().succ();
        let state = Arc::new(AppState::new(config, LogRing::new(50), Arc::new(remote.clone())));

        assert!(run_tier(state.clone(), Tier::Weekly, Trigger::Scheduled).await?.is_none());
        assert_eq!(remote.connections(), 0);
        assert!(state.store.scan()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_runs_do_not_overlap() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let state = test_state(&temp, world());

        let (a, b) = tokio::join!(
            run_tier(state.clone(), Tier::Daily, Trigger::Manual),
            run_tier(state.clone(), Tier::Weekly, Trigger::Manual),
        );
        let (a, b) = (a?.expect("ran"), b?.expect("ran"));

        let (first, second) = if a.started_at <= b.started_at { (a, b) } else { (b, a) };
        assert!(first.finished_at <= second.started_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_run_starts_after_shutdown() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let remote = world();
        let state = test_state(&temp, remote.clone());
        state.shutdown.cancel();

        assert!(run_tier(state.clone(), Tier::Daily, Trigger::Manual).await?.is_none());
        assert_eq!(remote.connections(), 0);
        assert!(state.store.scan()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_waiting_on_lock_is_dropped_at_shutdown() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let remote = world();
        let state = test_state(&temp, remote.clone());

        let guard = state.run_lock.lock().await;
        let waiting = tokio::spawn(run_tier(state.clone(), Tier::Hourly, Trigger::Manual));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        state.shutdown.cancel();
        drop(guard);

        assert!(waiting.await??.is_none());
        assert_eq!(remote.connections(), 0);
        Ok(())
    }
}
