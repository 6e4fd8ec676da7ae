//! Backup Engine Library
//!
//! Concurrent SFTP crawl-and-download engine with tiered snapshot retention
//! and disk-quota enforcement.

pub mod config;
pub mod executor;
pub mod remote;
pub mod snapshot;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::EngineConfig;
pub use executor::{run_backup, RunReport};
pub use snapshot::{Snapshot, SnapshotStore, Tier};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
