use crate::config::AppConfig;
use crate::services::tiered_backup::RunSummary;
use backup_engine::remote::SessionFactory;
use backup_engine::utils::LogRing;
use backup_engine::{SnapshotStore, Tier};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

pub type SharedRemote = Arc<dyn SessionFactory + Send + Sync>;

pub struct AppState {
    pub config: AppConfig,
    pub logs: LogRing,
    pub store: SnapshotStore,
    pub remote: SharedRemote,
    /// Held for a whole backup-plus-cleanup; runs never overlap
    pub run_lock: Mutex<()>,
    pub last_runs: RwLock<HashMap<Tier, RunSummary>>,
    pub started_at: Instant,
    /// Cancelled when the service starts shutting down; no new run starts after that
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, logs: LogRing, remote: SharedRemote) -> Self {
        let store = SnapshotStore::new(&config.engine.storage.backups_dir);
        Self {
            config,
            logs,
            store,
            remote,
            run_lock: Mutex::new(()),
            last_runs: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}
