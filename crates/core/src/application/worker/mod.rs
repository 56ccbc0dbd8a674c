// Delivery Worker - dequeue, publish, report

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::backoff::BackoffPolicy;
use crate::application::queue::QueueService;
use crate::domain::QueueItem;
use crate::error::Result;
use crate::port::{PublishError, Publisher, TimeProvider};
use chrono::Duration;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Per-batch tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub leased: usize,
    pub posted: usize,
    pub failed: usize,
    /// Items whose outcome could not be recorded; they stay `processing`
    pub unreported: usize,
}

/// Worker draining the queue through one publisher
///
/// No pooled connection is held while publishing: the batch is leased in one
/// call and each outcome is reported in its own call.
pub struct DeliveryWorker {
    name: String,
    queue: Arc<QueueService>,
    publisher: Arc<dyn Publisher>,
    backoff: BackoffPolicy,
    time_provider: Arc<dyn TimeProvider>,
    batch_size: u32,
}

impl DeliveryWorker {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<QueueService>,
        publisher: Arc<dyn Publisher>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            publisher,
            backoff: BackoffPolicy::default(),
            time_provider,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// A batch already leased is always finished before stopping.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.name, batch_size = self.batch_size, "Delivery worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_batch().await {
                Ok(summary) if summary.leased > 0 => {}
                Ok(_) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(worker = %self.name, error = %e, class = ?e.class(), "Dequeue failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(worker = %self.name, "Delivery worker stopped");
        Ok(())
    }

    /// Lease one batch and deliver every item in it
    pub async fn process_batch(&self) -> Result<BatchSummary> {
        let batch = self.queue.dequeue_batch(self.batch_size).await?;
        let mut summary = BatchSummary {
            leased: batch.len(),
            ..Default::default()
        };

        for item in batch {
            match self.deliver(item).await {
                Ok(true) => summary.posted += 1,
                Ok(false) => summary.failed += 1,
                Err(_) => summary.unreported += 1,
            }
        }

        if summary.leased > 0 {
            info!(
                worker = %self.name,
                leased = summary.leased,
                posted = summary.posted,
                failed = summary.failed,
                unreported = summary.unreported,
                "Batch processed"
            );
        }
        Ok(summary)
    }

    /// Publish one leased item and record the outcome; `Ok(true)` when posted
    async fn deliver(&self, item: QueueItem) -> Result<bool> {
        let item = Arc::new(item);
        let publisher = Arc::clone(&self.publisher);
        let to_publish = Arc::clone(&item);

        let published =
            execute_guarded(async move { publisher.publish(&to_publish).await }).await;

        let now = self.time_provider.now();
        let (reason, retry_at) = match published {
            PanicGuardResult::Success(Ok(())) => {
                return self.report(&item, self.queue.mark_posted(&item.id).await.map(|_| true));
            }
            PanicGuardResult::Success(Err(PublishError::RateLimited { retry_after })) => {
                let delay = Duration::from_std(retry_after).unwrap_or_else(|_| Duration::zero());
                ("rate limited".to_string(), now + delay)
            }
            PanicGuardResult::Success(Err(PublishError::Failed(msg))) => {
                (msg, self.backoff.next_attempt(&item, now))
            }
            PanicGuardResult::Panicked(msg) => (
                format!("publisher panicked: {}", msg),
                self.backoff.next_attempt(&item, now),
            ),
        };

        warn!(
            worker = %self.name,
            item_id = %item.id,
            platform = %item.platform,
            reason = %reason,
            "Delivery failed"
        );
        let reported = self
            .queue
            .mark_failed(&item.id, &reason, Some(retry_at))
            .await
            .map(|_| false);
        self.report(&item, reported)
    }

    fn report(&self, item: &QueueItem, result: Result<bool>) -> Result<bool> {
        if let Err(e) = &result {
            error!(
                worker = %self.name,
                item_id = %item.id,
                error = %e,
                class = ?e.class(),
                "Could not record delivery outcome"
            );
        }
        result
    }
}
