//! Backup run orchestration.
//!
//! One run mirrors the remote root into one snapshot directory:
//! - Walk the remote tree on a dedicated session, creating local directories
//!   and filling a queue built for this run
//! - Close the queue (end of input)
//! - Drain it with the worker pool and wait for every acknowledgment
//!
//! Per-file failures are logged and counted; the run still finishes. Only a
//! failed walk aborts it.

use crate::config::PoolConfig;
use crate::remote::SessionFactory;
use crate::transfer::{walk, JobQueue, PoolStats, WalkStats, WorkerPool};
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Outcome of one finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub remote_root: String,
    pub destination: PathBuf,
    pub walk: WalkStats,
    pub pool: PoolStats,
    pub duration: Duration,
}

impl RunReport {
    pub fn jobs_enqueued(&self) -> usize {
        self.walk.files
    }

    /// Every enqueued file landed
    pub fn is_complete(&self) -> bool {
        self.pool.failed == 0 && self.pool.fetched as usize == self.walk.files
    }
}

/// Back up `remote_root` into `destination`.
///
/// Returns once every enqueued job has been acknowledged. Errors only when
/// the walk fails (connection, listing or local directory creation).
pub fn run_backup<F: SessionFactory + ?Sized>(
    factory: &F,
    remote_root: &str,
    destination: &Path,
    config: &PoolConfig,
) -> Result<RunReport> {
    let start_time = Instant::now();
    let queue = JobQueue::new();

    info!(remote = %remote_root, path = %destination.display(), event = "walk_started", "Crawling remote tree");

    let walk_stats = {
        let mut session = factory.connect()?;
        let walked = walk(session.as_mut(), remote_root, destination, &queue);
        session.close();
        walked.map_err(|e| {
            error!(remote = %remote_root, path = %destination.display(), event = "walk_failed", reason = %e, "Backup aborted");
            e
        })?
    };
    queue.close();

    info!(
        files = walk_stats.files,
        dirs = walk_stats.dirs,
        skipped = walk_stats.skipped,
        "Remote tree crawled"
    );

    let pool_stats = WorkerPool::new(factory, config).run(&queue);

    let report = RunReport {
        remote_root: remote_root.to_string(),
        destination: destination.to_path_buf(),
        walk: walk_stats,
        pool: pool_stats,
        duration: start_time.elapsed(),
    };

    info!(
        path = %destination.display(),
        fetched = report.pool.fetched,
        failed = report.pool.failed,
        bytes = report.pool.bytes,
        duration_secs = report.duration.as_secs(),
        event = "run_finished",
        "Backup run finished"
    );
    Ok(report)
}
