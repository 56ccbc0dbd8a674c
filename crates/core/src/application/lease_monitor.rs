// Stuck lease monitor
//
// A worker that crashes between DequeueBatch and MarkPosted/MarkFailed leaves
// its items in `processing`. Those items are reported, never re-queued: the
// delivery may already have happened.

use crate::application::worker::constants::{DEFAULT_STUCK_CHECK_INTERVAL, DEFAULT_STUCK_THRESHOLD};
use crate::application::worker::ShutdownToken;
use crate::domain::QueueItem;
use crate::error::Result;
use crate::port::{QueueRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseMonitorConfig {
    /// Lease age after which an item counts as stuck (seconds)
    pub stuck_after_secs: u64,
    /// Seconds between checks
    pub check_interval_secs: u64,
}

impl Default for LeaseMonitorConfig {
    fn default() -> Self {
        Self {
            stuck_after_secs: DEFAULT_STUCK_THRESHOLD.as_secs(),
            check_interval_secs: DEFAULT_STUCK_CHECK_INTERVAL.as_secs(),
        }
    }
}

pub struct StuckLeaseMonitor {
    queue_repo: Arc<dyn QueueRepository>,
    time_provider: Arc<dyn TimeProvider>,
    config: LeaseMonitorConfig,
}

impl StuckLeaseMonitor {
    pub fn new(
        queue_repo: Arc<dyn QueueRepository>,
        time_provider: Arc<dyn TimeProvider>,
        config: LeaseMonitorConfig,
    ) -> Self {
        Self {
            queue_repo,
            time_provider,
            config,
        }
    }

    /// Processing items leased longer ago than the threshold; logs one warning each
    pub async fn check(&self) -> Result<Vec<QueueItem>> {
        let now = self.time_provider.now();
        let threshold = chrono::Duration::seconds(self.config.stuck_after_secs as i64);
        let stuck = self.queue_repo.find_stuck(now - threshold).await?;

        for item in &stuck {
            let leased_at = item.updated_at.unwrap_or(item.created_at);
            warn!(
                item_id = %item.id,
                platform = %item.platform,
                leased_at = %leased_at,
                lease_age_secs = (now - leased_at).num_seconds(),
                "Queue item stuck in processing"
            );
        }
        Ok(stuck)
    }

    /// Check periodically until shutdown
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            stuck_after_secs = self.config.stuck_after_secs,
            check_interval_secs = self.config.check_interval_secs,
            "Stuck lease monitor started"
        );

        let mut tick = interval(Duration::from_secs(self.config.check_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            match self.check().await {
                Ok(stuck) if !stuck.is_empty() => {
                    warn!(count = stuck.len(), "Stuck leases detected");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, class = ?e.class(), "Stuck lease check failed"),
            }
        }

        info!("Stuck lease monitor stopped");
    }
}
