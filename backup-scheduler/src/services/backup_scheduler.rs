use crate::services::tiered_backup::{self, Trigger};
use crate::state::AppState;
use backup_engine::Tier;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    pub async fn schedule_tier(&self, tier: Tier, cron_expression: &str) -> anyhow::Result<()> {
        let state = self.state.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                if let Err(e) = tiered_backup::run_tier(state, tier, Trigger::Scheduled).await {
                    tracing::error!(tier = %tier, error = %e, "Scheduled backup failed");
                }
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(tier = %tier, cron = %cron_expression, "Tier scheduled");
        Ok(())
    }

    pub async fn init_schedules(&self) -> anyhow::Result<()> {
        let config = &self.state.config;
        let schedules = [
            (Tier::Hourly, &config.cron_hourly),
            (Tier::Daily, &config.cron_daily),
            (Tier::Weekly, &config.cron_weekly),
        ];

        let mut count = 0;
        for (tier, cron) in schedules {
            if cron.trim().is_empty() {
                tracing::info!(tier = %tier, "No schedule configured, tier disabled");
                continue;
            }
            if let Err(e) = self.schedule_tier(tier, cron).await {
                tracing::error!(tier = %tier, cron = %cron, error = %e, "Failed to schedule tier");
            } else {
                count += 1;
            }
        }

        tracing::info!(count, "Cron schedules initialized");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tiered_backup::tests::test_state;
    use backup_engine::remote::MemoryRemote;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rejects_bad_cron_expression() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let scheduler = BackupScheduler::new(test_state(&temp, MemoryRemote::new())).await?;

        assert!(scheduler.schedule_tier(Tier::Hourly, "not a cron").await.is_err());
        assert!(scheduler.schedule_tier(Tier::Daily, "0 0 23 * * *").await.is_ok());
        Ok(())
    }
}
