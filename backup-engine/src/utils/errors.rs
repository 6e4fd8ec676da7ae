//! Error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job queue is closed")]
    QueueClosed,
}

impl EngineError {
    pub(crate) fn walk(path: impl Into<String>, source: EngineError) -> Self {
        EngineError::Walk {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
