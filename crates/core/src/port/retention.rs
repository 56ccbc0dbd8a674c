// Retention & Maintenance Port
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows removed by one queue sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub posted_deleted: u64,
    pub failed_deleted: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.posted_deleted + self.failed_deleted
    }
}

/// Storage statistics for one database file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub database: String,
    pub db_size_bytes: i64,
    pub db_size_mb: f64,
    pub fragmentation_percent: f64,
    /// Row count per table
    pub tables: BTreeMap<String, i64>,
}

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Posted/failed queue rows older than this are deleted (days)
    pub queue_retention_days: i64,

    /// Analytics samples older than this are deleted (days)
    pub analytics_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,

    /// Time between scheduled runs (hours)
    pub interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            queue_retention_days: 30,
            analytics_retention_days: 90,
            max_db_size_mb: 500.0,
            interval_hours: 24,
        }
    }
}

/// Summary of one full retention run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRun {
    pub sweep: SweepReport,
    pub analytics_deleted: u64,
    pub reclaimed_mb: f64,
    pub stats: StorageStats,
}

/// Deletion of terminal records and file upkeep
#[async_trait]
pub trait Retention: Send + Sync {
    /// Delete `posted` rows posted before `now - older_than` and `failed` rows
    /// last updated before it. Never touches `pending` or `processing`.
    async fn sweep(&self, older_than: Duration, now: DateTime<Utc>) -> Result<SweepReport>;

    /// Delete analytics samples older than `now - older_than`
    async fn sweep_analytics(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64>;

    /// Run VACUUM; returns space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    async fn stats(&self) -> Result<StorageStats>;

    /// Sweep, analytics sweep, then VACUUM when the file is over the threshold
    async fn run_full(&self, config: &RetentionConfig, now: DateTime<Utc>) -> Result<RetentionRun> {
        let stats_before = self.stats().await?;

        let sweep = self
            .sweep(Duration::days(config.queue_retention_days), now)
            .await?;
        let analytics_deleted = self
            .sweep_analytics(Duration::days(config.analytics_retention_days), now)
            .await?;

        let reclaimed_mb = if stats_before.db_size_mb > config.max_db_size_mb {
            self.vacuum().await?
        } else {
            0.0
        };

        let stats = self.stats().await?;

        tracing::info!(
            database = %stats.database,
            posted_deleted = sweep.posted_deleted,
            failed_deleted = sweep.failed_deleted,
            analytics_deleted,
            reclaimed_mb,
            db_size_mb = stats.db_size_mb,
            "Retention completed"
        );

        Ok(RetentionRun {
            sweep,
            analytics_deleted,
            reclaimed_mb,
            stats,
        })
    }
}
