//! Utility modules for the backup engine.

pub mod errors;
pub mod log_ring;
pub mod logger;

pub use errors::{EngineError, Result};
pub use log_ring::LogRing;
