// Retention Scheduler
// Periodic sweep of terminal queue rows and old analytics, plus VACUUM

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{Retention, RetentionConfig, RetentionRun, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Runs full retention every `interval_hours` in the background
pub struct RetentionScheduler {
    retention: Arc<dyn Retention>,
    config: RetentionConfig,
    time_provider: Arc<dyn TimeProvider>,
}

impl RetentionScheduler {
    pub fn new(
        retention: Arc<dyn Retention>,
        config: RetentionConfig,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            retention,
            config,
            time_provider,
        }
    }

    /// Run retention loop until shutdown (first run is immediate)
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_hours = self.config.interval_hours,
            queue_retention_days = self.config.queue_retention_days,
            analytics_retention_days = self.config.analytics_retention_days,
            "Retention scheduler started"
        );

        let period = Duration::from_secs(self.config.interval_hours.max(1) * 3600);
        let mut tick = interval(period);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            if let Err(e) = self.run_now().await {
                error!(error = %e, class = ?e.class(), "Scheduled retention failed");
            }
        }

        info!("Retention scheduler stopped");
    }

    /// Run retention immediately (for manual trigger)
    pub async fn run_now(&self) -> Result<RetentionRun> {
        self.retention
            .run_full(&self.config, self.time_provider.now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::{StorageStats, SweepReport};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    /// Records the cutoffs it was asked to sweep
    struct RecordingRetention {
        size_mb: f64,
        sweeps: Mutex<Vec<DateTime<Utc>>>,
        vacuums: Mutex<usize>,
    }

    #[async_trait]
    impl Retention for RecordingRetention {
        async fn sweep(&self, older_than: chrono::Duration, now: DateTime<Utc>) -> Result<SweepReport> {
            self.sweeps.lock().unwrap().push(now - older_than);
            Ok(SweepReport {
                posted_deleted: 2,
                failed_deleted: 1,
            })
        }

        async fn sweep_analytics(&self, _older_than: chrono::Duration, _now: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }

        async fn vacuum(&self) -> Result<f64> {
            *self.vacuums.lock().unwrap() += 1;
            Ok(1.5)
        }

        async fn stats(&self) -> Result<StorageStats> {
            Ok(StorageStats {
                database: "core".to_string(),
                db_size_mb: self.size_mb,
                ..Default::default()
            })
        }
    }

    fn scheduler(size_mb: f64) -> (RetentionScheduler, Arc<RecordingRetention>, DateTime<Utc>) {
        let now = Utc::now();
        let retention = Arc::new(RecordingRetention {
            size_mb,
            sweeps: Mutex::new(Vec::new()),
            vacuums: Mutex::new(0),
        });
        let scheduler = RetentionScheduler::new(
            retention.clone(),
            RetentionConfig::default(),
            Arc::new(ManualTimeProvider::new(now)),
        );
        (scheduler, retention, now)
    }

    #[tokio::test]
    async fn test_run_now_uses_configured_horizon() {
        let (scheduler, retention, now) = scheduler(10.0);

        let run = scheduler.run_now().await.unwrap();
        assert_eq!(run.sweep.total(), 3);
        assert_eq!(run.reclaimed_mb, 0.0);
        assert_eq!(
            retention.sweeps.lock().unwrap().as_slice(),
            &[now - chrono::Duration::days(30)]
        );
        assert_eq!(*retention.vacuums.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vacuum_when_over_threshold() {
        let (scheduler, retention, _) = scheduler(10_000.0);

        let run = scheduler.run_now().await.unwrap();
        assert_eq!(run.reclaimed_mb, 1.5);
        assert_eq!(*retention.vacuums.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (scheduler, _, _) = scheduler(10.0);
        let (sender, token) = crate::application::worker::shutdown_channel();

        let handle = tokio::spawn(scheduler.run(token));
        sender.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
