//! Size-based eviction across all tiers.
//!
//! While the snapshots together exceed the byte budget, the one with the
//! oldest `created_at` is deleted, whatever its tier.

use super::retention::delete_snapshot;
use super::Snapshot;
use crate::Result;
use std::collections::VecDeque;
use tracing::info;

#[derive(Debug, Default)]
pub struct QuotaOutcome {
    pub deleted: Vec<Snapshot>,
    /// Size of the snapshots left behind
    pub total_bytes: u64,
}

pub fn enforce_quota(snapshots: Vec<Snapshot>, max_total_bytes: u64) -> Result<QuotaOutcome> {
    let mut sized = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let size = snapshot.size_bytes()?;
        sized.push((snapshot, size));
    }
    sized.sort_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));

    let mut total: u64 = sized.iter().map(|(_, size)| size).sum();
    let mut remaining: VecDeque<(Snapshot, u64)> = sized.into();
    let mut deleted = Vec::new();

    while total > max_total_bytes {
        let Some((oldest, size)) = remaining.pop_front() else {
            break;
        };

        info!(
            tier = %oldest.tier,
            path = %oldest.path.display(),
            event = "snapshot_evicted",
            reason = %format!("total {total} bytes > quota {max_total_bytes} bytes"),
            "Deleting oldest backup to free space"
        );
        delete_snapshot(&oldest)?;
        total -= size;
        deleted.push(oldest);
    }

    Ok(QuotaOutcome {
        deleted,
        total_bytes: total,
    })
}
