//! Unistore Daemon - Main Entry Point
//!
//! Opens the unified databases, optionally consolidates legacy stores, then
//! runs retention and the stuck-lease monitor until Ctrl+C.

mod logging;
mod settings;

use anyhow::{Context, Result};
use settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use unistore_core::application::{
    shutdown_channel, ConsolidationService, RetentionScheduler, StuckLeaseMonitor,
};
use unistore_core::domain::LogicalDatabase;
use unistore_core::port::{QueueRepository, SystemTimeProvider, TimeProvider};
use unistore_infra_sqlite::{SqliteMigrator, SqliteQueueRepository, SqliteRetention, Storage};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let settings = Settings::load().context("failed to load settings")?;
    let _log_guard = logging::init(settings.log_dir.as_deref())?;

    info!("Unistore daemon v{} starting...", VERSION);

    // 2. Open every logical database; schemas are ensured before anything else runs
    info!(data_dir = %settings.storage.data_dir.display(), "Opening storage...");
    let storage = Storage::open_all(&settings.storage)
        .await
        .context("storage could not be opened")?;

    // 3. Consolidation (one-time, safe to repeat)
    if settings.consolidate_on_start {
        match &settings.legacy_dir {
            Some(legacy_dir) => {
                let service =
                    ConsolidationService::new(Arc::new(SqliteMigrator::new(&storage)), legacy_dir);
                match service.consolidate(&LogicalDatabase::ALL).await {
                    Ok(report) => info!(
                        rows_migrated = report.rows_migrated(),
                        "Legacy stores consolidated"
                    ),
                    Err(e) => error!(error = %e, "Consolidation failed"),
                }
            }
            None => warn!("consolidate_on_start is set but legacy_dir is not"),
        }
    }

    // 4. Wiring
    let core = storage.pool(LogicalDatabase::Core)?.clone();
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let queue_repo: Arc<dyn QueueRepository> = Arc::new(SqliteQueueRepository::new(core.clone()));
    let retention = Arc::new(SqliteRetention::new(core));

    match queue_repo.status().await {
        Ok(report) => info!(
            pending = report.total_pending(),
            posted = report.total_posted(),
            failed = report.total_failed(),
            "Queue status"
        ),
        Err(e) => warn!(error = %e, "Queue status unavailable"),
    }

    // 5. Background tasks
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    info!("Starting retention scheduler...");
    let retention_scheduler =
        RetentionScheduler::new(retention, settings.retention.clone(), time_provider.clone());
    let retention_handle = tokio::spawn(retention_scheduler.run(shutdown_rx));

    info!("Starting stuck-lease monitor...");
    let monitor = StuckLeaseMonitor::new(
        queue_repo,
        time_provider,
        settings.lease_monitor.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown_tx.token()));

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    for (name, handle) in [("retention", retention_handle), ("lease-monitor", monitor_handle)] {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!(task = name, "Background task did not stop in time");
        }
    }
    storage.close().await;

    info!("Shutdown complete.");
    Ok(())
}
