//! Crawl-and-download pipeline: walker → job queue → worker pool.

pub mod pool;
pub mod queue;
pub mod walker;

use std::path::PathBuf;

pub use pool::{PoolStats, WorkerPool};
pub use queue::{Dequeue, JobQueue, JobTicket};
pub use walker::{walk, WalkStats};

/// One file transfer: a remote file and where it lands locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl Job {
    pub fn new(remote_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_path: local_path.into(),
        }
    }
}
