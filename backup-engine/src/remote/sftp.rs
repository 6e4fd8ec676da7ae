//! SFTP sessions over libssh2.

use super::{EntryKind, RemoteEntry, RemoteSession, SessionFactory};
use crate::config::RemoteConfig;
use crate::{EngineError, Result};
use std::net::TcpStream;
use std::path::Path;
use tracing::{debug, warn};

/// Password-authenticated SFTP connection settings
#[derive(Clone)]
pub struct SftpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl std::fmt::Debug for SftpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SftpConnector {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(&config.host, config.port, &config.username, &config.password)
    }

    fn open(&self) -> Result<SftpSession> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| EngineError::Connect(format!("{}:{}: {}", self.host, self.port, e)))?;

        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| EngineError::Connect(format!("SSH handshake failed: {}", e)))?;

        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| EngineError::Connect(format!("SSH authentication failed: {}", e)))?;
        if !session.authenticated() {
            return Err(EngineError::Connect("SSH authentication failed".into()));
        }

        let sftp = session.sftp()?;
        debug!(host = %self.host, port = self.port, "SFTP session opened");
        Ok(SftpSession { session, sftp })
    }
}

impl SessionFactory for SftpConnector {
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        Ok(Box::new(self.open()?))
    }
}

pub struct SftpSession {
    session: ssh2::Session,
    sftp: ssh2::Sftp,
}

impl RemoteSession for SftpSession {
    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let listing = self.sftp.readdir(Path::new(path))?;

        let entries = listing
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_name(&entry_path, path)?;
                let (kind, mode) = match stat.perm {
                    Some(mode) => (EntryKind::from_mode(mode), mode),
                    None if stat.is_dir() => (EntryKind::Directory, 0),
                    None => (EntryKind::File, 0),
                };
                Some(RemoteEntry { name, kind, mode })
            })
            .collect();

        Ok(entries)
    }

    fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let mut remote = self.sftp.open(Path::new(remote_path))?;
        let mut local = std::fs::File::create(local_path)?;

        match std::io::copy(&mut remote, &mut local) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                drop(local);
                let _ = std::fs::remove_file(local_path);
                Err(e.into())
            }
        }
    }

    fn close(self: Box<Self>) {
        let SftpSession { session, sftp } = *self;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "backup finished", None) {
            debug!(error = %e, "SFTP disconnect failed");
        }
    }
}

/// Final component of a listed path, if it is valid UTF-8.
///
/// A lossily converted name would point at a path that does not exist on the
/// remote, so such entries are skipped instead.
fn entry_name(entry_path: &Path, dir: &str) -> Option<String> {
    let raw = entry_path.file_name()?;
    match raw.to_str() {
        Some(name) => Some(name.to_string()),
        None => {
            warn!(remote = %dir, name = %raw.to_string_lossy(), "Skipping entry with non-UTF-8 name");
            None
        }
    }
}
