pub mod backup_scheduler;
pub mod tiered_backup;
