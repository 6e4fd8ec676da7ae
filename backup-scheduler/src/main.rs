//! Tiered backup service - Main entry point
//!
//! Pulls a remote world directory over SFTP into hourly, daily and weekly
//! snapshots, prunes old ones and serves a status page.

mod config;
mod error;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::backup_scheduler::BackupScheduler;
use crate::services::tiered_backup::{self, RunSummary, Trigger};
use crate::state::AppState;
use backup_engine::remote::SftpConnector;
use backup_engine::utils::{logger, LogRing};
use backup_engine::{EngineConfig, Tier};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (TOML), replaces the SFTP_* / RETENTION_* environment
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run one backup of the given tier, clean up and exit
    #[arg(long, value_name = "TIER", conflicts_with = "cleanup_only")]
    run_once: Option<Tier>,

    /// Run retention and quota once and exit
    #[arg(long)]
    cleanup_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(path) = &args.config {
        config.engine = EngineConfig::from_file(path)?;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Initialize logging
    let logs = LogRing::new(config.log_buffer_lines);
    logger::init(&config.log_level, logs.clone())?;

    config.engine.validate()?;
    std::fs::create_dir_all(&config.engine.storage.backups_dir)?;

    tracing::info!(
        "Starting backup-scheduler v{} (remote {}:{}{}, backups in {})",
        env!("CARGO_PKG_VERSION"),
        config.engine.remote.host,
        config.engine.remote.port,
        config.engine.remote.root,
        config.engine.storage.backups_dir.display()
    );

    let remote = Arc::new(SftpConnector::from_config(&config.engine.remote));
    let state = Arc::new(AppState::new(config, logs, remote));

    if let Some(tier) = args.run_once {
        return match tiered_backup::run_tier(state, tier, Trigger::Manual).await? {
            Some(RunSummary { error: Some(e), .. }) => anyhow::bail!("{} backup failed: {}", tier, e),
            _ => Ok(()),
        };
    }
    if args.cleanup_only {
        let report = tiered_backup::run_cleanup(&state).await?;
        tracing::info!(
            expired = report.expired.len(),
            evicted = report.evicted.len(),
            total_bytes = report.total_bytes,
            "Cleanup finished"
        );
        return Ok(());
    }

    // Initialize cron scheduler
    let scheduler = match BackupScheduler::new(state.clone()).await {
        Ok(s) => {
            if let Err(e) = s.init_schedules().await {
                tracing::warn!("Failed to initialize schedules: {}", e);
            }
            if let Err(e) = s.start().await {
                tracing::warn!("Failed to start scheduler: {}", e);
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    let app = routes::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    tracing::info!("Shutting down...");

    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    // A backup in flight finishes before exit
    let _guard = state.run_lock.lock().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    // refuse new runs from here on
    cancel.cancel();
}
