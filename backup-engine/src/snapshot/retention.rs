//! Age-based expiry.
//!
//! A snapshot is deleted once its age is strictly greater than its tier's
//! limit. There is no grace period and no minimum count per tier.

use super::Snapshot;
use crate::config::RetentionPolicy;
use crate::{EngineError, Result};
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Default)]
pub struct RetentionOutcome {
    pub kept: Vec<Snapshot>,
    pub deleted: Vec<Snapshot>,
}

pub fn is_expired(snapshot: &Snapshot, now: DateTime<Utc>, policy: &RetentionPolicy) -> bool {
    snapshot.age(now) > policy.max_age(snapshot.tier)
}

/// Delete every expired snapshot. The first failed deletion aborts the pass.
pub fn enforce_retention(
    snapshots: Vec<Snapshot>,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Result<RetentionOutcome> {
    let mut outcome = RetentionOutcome::default();

    for snapshot in snapshots {
        if !is_expired(&snapshot, now, policy) {
            outcome.kept.push(snapshot);
            continue;
        }

        info!(
            tier = %snapshot.tier,
            path = %snapshot.path.display(),
            event = "snapshot_expired",
            reason = %format!(
                "age {:.2}h > {}h",
                snapshot.age_hours(now),
                policy.max_age_hours(snapshot.tier)
            ),
            "Deleting backup"
        );
        delete_snapshot(&snapshot)?;
        outcome.deleted.push(snapshot);
    }

    Ok(outcome)
}

pub(crate) fn delete_snapshot(snapshot: &Snapshot) -> Result<()> {
    std::fs::remove_dir_all(&snapshot.path).map_err(|source| EngineError::Delete {
        path: snapshot.path.clone(),
        source,
    })
}
