//! Remote tree enumeration.
//!
//! Lists a remote subtree depth-first with an explicit worklist, creates the
//! mirrored local directories as it goes, and enqueues one [`Job`] per file.
//! Any listing or directory-creation failure aborts the walk.

use super::{Job, JobQueue};
use crate::remote::{join_remote, EntryKind, RemoteSession};
use crate::{EngineError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Counts from one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Directories listed, the root included
    pub dirs: usize,

    /// Jobs enqueued
    pub files: usize,

    /// Special files and unsafe names left out
    pub skipped: usize,
}

/// Walk `remote_root`, mirroring its directories under `local_root` and
/// putting a job for every file on `queue`.
pub fn walk(
    session: &mut dyn RemoteSession,
    remote_root: &str,
    local_root: &Path,
    queue: &JobQueue,
) -> Result<WalkStats> {
    let mut stats = WalkStats::default();
    let mut pending: Vec<(String, PathBuf)> = vec![(remote_root.to_string(), local_root.to_path_buf())];

    while let Some((remote_dir, local_dir)) = pending.pop() {
        std::fs::create_dir_all(&local_dir).map_err(|e| EngineError::walk(&remote_dir, e.into()))?;

        let entries = session
            .list_entries(&remote_dir)
            .map_err(|e| EngineError::walk(&remote_dir, e))?;
        stats.dirs += 1;

        // Reversed so the stack pops subdirectories in listing order
        let mut subdirs = Vec::new();
        for entry in entries {
            if !is_safe_name(&entry.name) {
                warn!(remote = %remote_dir, name = %entry.name, "Skipping entry with unsafe name");
                stats.skipped += 1;
                continue;
            }

            let remote_path = join_remote(&remote_dir, &entry.name);
            let local_path = local_dir.join(&entry.name);

            match entry.kind {
                EntryKind::Directory => subdirs.push((remote_path, local_path)),
                EntryKind::File | EntryKind::Symlink => {
                    queue.put(Job::new(remote_path, local_path))?;
                    stats.files += 1;
                }
                EntryKind::Other => {
                    debug!(remote = %remote_path, mode = %format!("{:o}", entry.mode), "Skipping special file");
                    stats.skipped += 1;
                }
            }
        }
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(stats)
}

/// A single path component that cannot escape the directory it is joined to
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, SessionFactory};
    use crate::transfer::Dequeue;
    use std::time::Duration;
    use tempfile::TempDir;

    fn drain(queue: &JobQueue) -> Vec<Job> {
        let mut jobs = Vec::new();
        while let Dequeue::Job(ticket) = queue.get(Duration::ZERO) {
            jobs.push(ticket.job().clone());
        }
        jobs
    }

    #[test]
    fn test_walk_enqueues_files_and_creates_dirs() -> Result<()> {
        let temp = TempDir::new()?;
        let remote = MemoryRemote::new();
        remote
            .add_file("/world/level.dat", "lvl")
            .add_file("/world/region/r.0.0.mca", "a")
            .add_file("/world/region/r.0.1.mca", "b")
            .add_dir("/world/empty/nested")
            .add_special("/world/session.fifo");

        let queue = JobQueue::new();
        let mut session = remote.connect()?;
        let stats = walk(session.as_mut(), "/world", temp.path(), &queue)?;

        assert_eq!(stats.files, 3);
        assert_eq!(stats.dirs, 4);
        assert_eq!(stats.skipped, 1);
        assert!(temp.path().join("region").is_dir());
        assert!(temp.path().join("empty/nested").is_dir());

        let jobs = drain(&queue);
        assert_eq!(jobs.len(), 3);
        assert!(jobs.contains(&Job::new("/world/region/r.0.1.mca", temp.path().join("region/r.0.1.mca"))));
        for job in &jobs {
            assert!(job.local_path.starts_with(temp.path()));
        }
        Ok(())
    }

    #[test]
    fn test_walk_fails_on_listing_error() -> Result<()> {
        let temp = TempDir::new()?;
        let remote = MemoryRemote::new();
        remote.add_file("/world/a", "a").add_file("/world/locked/b", "b").fail_list("/world/locked");

        let queue = JobQueue::new();
        let mut session = remote.connect()?;
        let err = walk(session.as_mut(), "/world", temp.path(), &queue).unwrap_err();

        match err {
            EngineError::Walk { path, .. } => assert_eq!(path, "/world/locked"),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_walk_missing_root() -> Result<()> {
        let temp = TempDir::new()?;
        let remote = MemoryRemote::new();
        let queue = JobQueue::new();
        let mut session = remote.connect()?;

        assert!(walk(session.as_mut(), "/world", temp.path(), &queue).is_err());
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn test_deep_tree() -> Result<()> {
        let temp = TempDir::new()?;
        let remote = MemoryRemote::new();
        let deep: String = (0..200).map(|i| format!("/d{i}")).collect();
        remote.add_file(&format!("{deep}/leaf.txt"), "leaf");

        let queue = JobQueue::new();
        let mut session = remote.connect()?;
        let stats = walk(session.as_mut(), "/", temp.path(), &queue)?;

        assert_eq!(stats.files, 1);
        assert_eq!(stats.dirs, 201);
        Ok(())
    }

    #[test]
    fn test_unsafe_names() {
        assert!(is_safe_name("level.dat"));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("."));
        assert!(!is_safe_name("a/b"));
        assert!(!is_safe_name(""));
    }
}
