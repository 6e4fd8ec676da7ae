use crate::error::AppError;
use crate::services::tiered_backup::{self, RunSummary, Trigger};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use backup_engine::snapshot::CleanupReport;
use backup_engine::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/snapshots", get(list_snapshots))
        .route("/runs", get(last_runs))
        .route("/backups/{tier}", post(start_backup))
        .route("/cleanup", post(start_cleanup))
}

#[derive(Serialize)]
struct SnapshotView {
    tier: Tier,
    path: String,
    created_at: DateTime<Utc>,
    size_bytes: u64,
    age_hours: f64,
}

async fn list_snapshots(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SnapshotView>>, AppError> {
    let state2 = state.clone();
    let views = tokio::task::spawn_blocking(move || {
        let now = Utc::now();
        let mut views = Vec::new();
        for snapshot in state2.store.scan()? {
            views.push(SnapshotView {
                size_bytes: snapshot.size_bytes()?,
                age_hours: snapshot.age_hours(now),
                tier: snapshot.tier,
                path: snapshot.path.display().to_string(),
                created_at: snapshot.created_at,
            });
        }
        Ok::<_, anyhow::Error>(views)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(Json(views))
}

async fn last_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunSummary>> {
    let runs = state.last_runs.read().await;
    let mut runs: Vec<RunSummary> = runs.values().cloned().collect();
    runs.sort_by_key(|r| r.tier);
    Json(runs)
}

async fn start_backup(
    State(state): State<Arc<AppState>>,
    Path(tier): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tier: Tier = tier.parse().map_err(|e: backup_engine::EngineError| AppError::BadRequest(e.to_string()))?;
    if state.shutdown.is_cancelled() {
        return Err(AppError::Unavailable("Shutting down, no new backups".into()));
    }

    // Spawn the backup as a background task
    tokio::spawn(async move {
        if let Err(e) = tiered_backup::run_tier(state, tier, Trigger::Manual).await {
            tracing::error!(tier = %tier, "Manual backup failed: {:#}", e);
        }
    });

    Ok(Json(serde_json::json!({ "started": true, "tier": tier })))
}

async fn start_cleanup(State(state): State<Arc<AppState>>) -> Result<Json<CleanupReport>, AppError> {
    let report = tiered_backup::run_cleanup(&state).await?;
    Ok(Json(report))
}
