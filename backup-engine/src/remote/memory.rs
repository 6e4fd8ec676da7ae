//! In-memory remote tree.
//!
//! Behaves like a remote host for the walker and the worker pool: sessions
//! list and fetch from a shared tree. Individual fetches and connection
//! attempts can be made to fail.

use super::{EntryKind, RemoteEntry, RemoteSession, SessionFactory};
use crate::{EngineError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DIR_MODE: u32 = 0o040755;
const FILE_MODE: u32 = 0o100644;
const FIFO_MODE: u32 = 0o010644;

#[derive(Default)]
struct Tree {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    specials: BTreeSet<String>,
    failing_fetches: HashSet<String>,
    failing_lists: HashSet<String>,
    refused_connects: usize,
    connects: usize,
    closes: usize,
    fetches: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.lock().dirs.insert("/".to_string());
        remote
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a directory and all of its ancestors
    pub fn add_dir(&self, path: &str) -> &Self {
        let mut tree = self.lock();
        let mut current = normalize(path);
        loop {
            tree.dirs.insert(current.clone());
            match parent_of(&current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        self
    }

    /// Add a file, creating its parent directories
    pub fn add_file(&self, path: &str, contents: impl Into<Vec<u8>>) -> &Self {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.lock().files.insert(path, contents.into());
        self
    }

    /// Add a fifo entry; it lists but cannot be fetched
    pub fn add_special(&self, path: &str) -> &Self {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.lock().specials.insert(path);
        self
    }

    /// Every fetch of `path` fails with an I/O error
    pub fn fail_fetch(&self, path: &str) -> &Self {
        self.lock().failing_fetches.insert(normalize(path));
        self
    }

    /// Every listing of `path` fails
    pub fn fail_list(&self, path: &str) -> &Self {
        self.lock().failing_lists.insert(normalize(path));
        self
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_connects(&self, count: usize) -> &Self {
        self.lock().refused_connects = count;
        self
    }

    /// Successful connections so far
    pub fn connections(&self) -> usize {
        self.lock().connects
    }

    /// Sessions closed so far
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Fetch attempts per remote path, failed ones included
    pub fn fetch_counts(&self) -> HashMap<String, usize> {
        self.lock().fetches.clone()
    }
}

impl SessionFactory for MemoryRemote {
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let mut tree = self.lock();
        if tree.refused_connects > 0 {
            tree.refused_connects -= 1;
            return Err(EngineError::Connect("connection refused".into()));
        }
        tree.connects += 1;
        Ok(Box::new(MemorySession {
            tree: Arc::clone(&self.tree),
        }))
    }
}

struct MemorySession {
    tree: Arc<Mutex<Tree>>,
}

impl RemoteSession for MemorySession {
    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = normalize(path);
        let tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);

        if tree.failing_lists.contains(&path) {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot list {path}"),
            )));
        }
        if !tree.dirs.contains(&path) {
            return Err(EngineError::NotFound(path));
        }

        let is_child = |candidate: &String| parent_of(candidate).as_deref() == Some(path.as_str());
        let entry = |full: &String, mode: u32| RemoteEntry {
            name: full.rsplit('/').next().unwrap_or_default().to_string(),
            kind: EntryKind::from_mode(mode),
            mode,
        };

        let mut entries: Vec<RemoteEntry> = tree
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(|d| entry(d, DIR_MODE))
            .chain(tree.files.keys().filter(|f| is_child(f)).map(|f| entry(f, FILE_MODE)))
            .chain(tree.specials.iter().filter(|s| is_child(s)).map(|s| entry(s, FIFO_MODE)))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let path = normalize(remote_path);
        let contents = {
            let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
            *tree.fetches.entry(path.clone()).or_insert(0) += 1;

            if tree.failing_fetches.contains(&path) {
                return Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated I/O error",
                )));
            }
            tree.files
                .get(&path)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(path.clone()))?
        };

        std::fs::write(local_path, &contents)?;
        Ok(contents.len() as u64)
    }

    fn close(self: Box<Self>) {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner).closes += 1;
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}
