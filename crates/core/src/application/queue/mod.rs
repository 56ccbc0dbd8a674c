// Queue Service - Producer and worker use cases over the durable queue

pub mod enqueue;

pub use enqueue::EnqueueRequest;

use crate::domain::{FailureOutcome, PostOutcome, QueueItem, QueueStatusReport};
use crate::error::Result;
use crate::port::{EnqueueOutcome, IdProvider, QueueRepository, TimeProvider};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct QueueService {
    queue_repo: Arc<dyn QueueRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueService {
    pub fn new(
        queue_repo: Arc<dyn QueueRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue_repo,
            id_provider,
            time_provider,
        }
    }

    /// Enqueue content for a platform; duplicates are reported, not rejected
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<EnqueueOutcome> {
        enqueue::execute(
            self.queue_repo.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await
    }

    /// Lease up to `limit` due items
    pub async fn dequeue_batch(&self, limit: u32) -> Result<Vec<QueueItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.queue_repo
            .dequeue_batch(limit, self.time_provider.now())
            .await
    }

    pub async fn mark_posted(&self, id: &str) -> Result<PostOutcome> {
        let outcome = self
            .queue_repo
            .mark_posted(id, self.time_provider.now())
            .await?;
        if outcome == PostOutcome::Posted {
            info!(item_id = %id, "Item posted");
        }
        Ok(outcome)
    }

    /// Report a failed delivery; `retry_at` overrides when the retry becomes due
    pub async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<FailureOutcome> {
        let outcome = self
            .queue_repo
            .mark_failed(id, reason, self.time_provider.now(), retry_at)
            .await?;

        match &outcome {
            FailureOutcome::Requeued {
                retry_count,
                retry_at,
            } => info!(
                item_id = %id,
                retry_count,
                retry_at = ?retry_at,
                reason,
                "Item re-queued after failure"
            ),
            FailureOutcome::Failed { retry_count } => warn!(
                item_id = %id,
                retry_count,
                reason,
                "Item failed permanently"
            ),
        }
        Ok(outcome)
    }

    pub async fn status(&self) -> Result<QueueStatusReport> {
        self.queue_repo.status().await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>> {
        self.queue_repo.find_by_id(id).await
    }

    pub async fn queue_position(&self, id: &str) -> Result<Option<u64>> {
        self.queue_repo.queue_position(id).await
    }
}
