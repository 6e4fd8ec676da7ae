//! Fixed-size pool of download workers.
//!
//! Each worker:
//! - Opens its own remote session (sessions are never shared)
//! - Takes jobs from the queue until it is closed and drained
//! - Creates the local parent directory and fetches the file
//! - Logs and counts failures, then moves on to the next job
//!
//! The last worker to exit abandons whatever is still queued, so a pool in
//! which every worker failed to connect cannot leave `join` hanging.

use super::{Dequeue, Job, JobQueue};
use crate::config::PoolConfig;
use crate::remote::{RemoteSession, SessionFactory};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn, Span};

/// Counts from one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub fetched: u64,
    pub failed: u64,
    pub bytes: u64,
    pub workers_connected: u64,
    pub connect_failures: u64,
    /// Jobs no worker was left to take
    pub abandoned: u64,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    workers_connected: AtomicU64,
    connect_failures: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn record_fetch(&self, bytes: u64) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            workers_connected: self.workers_connected.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool<'a, F: SessionFactory + ?Sized> {
    factory: &'a F,
    workers: usize,
    queue_timeout: Duration,
}

impl<'a, F: SessionFactory + ?Sized> WorkerPool<'a, F> {
    pub fn new(factory: &'a F, config: &PoolConfig) -> Self {
        Self {
            factory,
            workers: config.workers.max(1),
            queue_timeout: config.queue_timeout(),
        }
    }

    /// Run the workers until `queue` is drained and every job acknowledged.
    ///
    /// The producer must `close` the queue; until then idle workers keep
    /// waiting for input.
    pub fn run(&self, queue: &JobQueue) -> PoolStats {
        let counters = Counters::default();
        let live = AtomicUsize::new(self.workers);

        info!(workers = self.workers, jobs = queue.len(), "Starting download workers");

        // workers log inside the caller's span (the run's tier)
        let parent = Span::current();

        thread::scope(|scope| {
            for id in 0..self.workers {
                let counters = &counters;
                let live = &live;
                let parent = &parent;
                let spawned = thread::Builder::new()
                    .name(format!("fetch-{id}"))
                    .spawn_scoped(scope, move || {
                        let _span = parent.enter();
                        let _retire = Retire { live, queue, counters };
                        self.worker_loop(id, queue, counters);
                    });

                if let Err(e) = spawned {
                    error!(worker = id, error = %e, "Failed to spawn download worker");
                    counters.connect_failures.fetch_add(1, Ordering::Relaxed);
                    drop(Retire { live, queue, counters });
                }
            }

            queue.join();
        });

        let stats = counters.snapshot();
        info!(
            fetched = stats.fetched,
            failed = stats.failed,
            bytes = stats.bytes,
            "Download workers finished"
        );
        stats
    }

    fn worker_loop(&self, id: usize, queue: &JobQueue, counters: &Counters) {
        let mut session = match self.factory.connect() {
            Ok(session) => session,
            Err(e) => {
                error!(worker = id, error = %e, event = "worker_connect_failed", "Worker failed to connect");
                counters.connect_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        counters.workers_connected.fetch_add(1, Ordering::Relaxed);

        loop {
            match queue.get(self.queue_timeout) {
                Dequeue::Job(ticket) => {
                    let job = ticket.job();
                    debug!(worker = id, remote = %job.remote_path, local = %job.local_path.display(), "Downloading");
                    match fetch(session.as_mut(), job) {
                        Ok(bytes) => counters.record_fetch(bytes),
                        Err(e) => {
                            counters.record_failure();
                            warn!(
                                worker = id,
                                path = %job.remote_path,
                                event = "fetch_failed",
                                reason = %e,
                                "Error downloading file"
                            );
                        }
                    }
                }
                Dequeue::Idle => trace!(worker = id, "Queue idle"),
                Dequeue::Drained => break,
            }
        }

        session.close();
        debug!(worker = id, "Worker finished");
    }
}

fn fetch(session: &mut dyn RemoteSession, job: &Job) -> Result<u64> {
    if let Some(parent) = job.local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    session.fetch(&job.remote_path, &job.local_path)
}

/// Marks a worker as gone when dropped, panics included.
struct Retire<'a> {
    live: &'a AtomicUsize,
    queue: &'a JobQueue,
    counters: &'a Counters,
}

impl Drop for Retire<'_> {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let abandoned = self.queue.abandon_remaining();
        if abandoned.is_empty() {
            return;
        }
        for job in &abandoned {
            warn!(path = %job.remote_path, event = "fetch_failed", reason = "no worker available", "Error downloading file");
        }
        let count = abandoned.len() as u64;
        self.counters.abandoned.fetch_add(count, Ordering::Relaxed);
        self.counters.failed.fetch_add(count, Ordering::Relaxed);
        error!(count, "All download workers exited with jobs still queued");
    }
}
