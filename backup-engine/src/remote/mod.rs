//! Remote file-transfer sessions.
//!
//! The engine never talks to a protocol directly: the walker and every
//! worker open their own [`RemoteSession`] through a shared
//! [`SessionFactory`]. [`sftp`] is the production backend, [`memory`] an
//! in-process tree for tests and dry runs.

pub mod memory;
pub mod sftp;

use crate::Result;
use std::path::Path;

pub use memory::MemoryRemote;
pub use sftp::{SftpConnector, SftpSession};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    /// Fifo, socket or device node
    Other,
}

impl EntryKind {
    /// Classify a POSIX `st_mode`
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => EntryKind::Directory,
            S_IFREG => EntryKind::File,
            S_IFLNK => EntryKind::Symlink,
            _ => EntryKind::Other,
        }
    }
}

/// One child of a listed remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub mode: u32,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One authenticated connection to the remote host.
///
/// A session is owned by exactly one thread and never shared.
pub trait RemoteSession {
    /// List the immediate children of `path`
    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Download `remote_path` into `local_path`, returning the bytes written
    fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// Close the connection
    fn close(self: Box<Self>);
}

/// Opens sessions; shared by reference across all workers of a run.
pub trait SessionFactory: Sync {
    fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

/// Join a remote directory and a child name with `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_from_mode() {
        assert_eq!(EntryKind::from_mode(0o040755), EntryKind::Directory);
        assert_eq!(EntryKind::from_mode(0o100644), EntryKind::File);
        assert_eq!(EntryKind::from_mode(0o120777), EntryKind::Symlink);
        assert_eq!(EntryKind::from_mode(0o010644), EntryKind::Other);
        assert_eq!(EntryKind::from_mode(0), EntryKind::Other);
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/world", "level.dat"), "/world/level.dat");
        assert_eq!(join_remote("/", "world"), "/world");
        assert_eq!(join_remote("/world/", "region"), "/world/region");
    }
}
