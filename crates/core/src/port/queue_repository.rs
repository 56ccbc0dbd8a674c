// Queue Repository Port (Interface)

use crate::domain::{FailureOutcome, PostOutcome, QueueItem, QueueStatusReport};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of an enqueue attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    /// New item ID, or the active item that already holds this content
    pub item_id: String,
    pub content_hash: String,
    pub duplicate: bool,
}

/// Repository interface for the durable queue
///
/// Every method is a single transaction; callers never hold a connection
/// between calls.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a pending item unless an active item with the same
    /// `(content_hash, platform)` exists
    ///
    /// Losing a concurrent race is reported as `duplicate`, not as an error.
    async fn enqueue(&self, item: &QueueItem) -> Result<EnqueueOutcome>;

    /// Lease up to `limit` due pending items
    ///
    /// Ordered `priority DESC, created_at ASC`; no item is returned to two callers.
    async fn dequeue_batch(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<QueueItem>>;

    /// processing -> posted; no-op on already-posted items
    async fn mark_posted(&self, id: &str, now: DateTime<Utc>) -> Result<PostOutcome>;

    /// processing -> pending (retry) | failed
    async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        now: DateTime<Utc>,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<FailureOutcome>;

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>>;

    async fn status(&self) -> Result<QueueStatusReport>;

    /// 1-based position among pending items; `None` unless the item is pending
    async fn queue_position(&self, id: &str) -> Result<Option<u64>>;

    /// Processing items whose lease started before `leased_before`
    async fn find_stuck(&self, leased_before: DateTime<Utc>) -> Result<Vec<QueueItem>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::status::{FailureSummary, RECENT_FAILURE_LIMIT};
    use crate::domain::QueueStatus;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory queue with the same dedup and ordering rules as the SQLite adapter
    #[derive(Default)]
    pub struct InMemoryQueueRepository {
        items: Mutex<Vec<QueueItem>>,
    }

    impl InMemoryQueueRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn snapshot(&self) -> Vec<QueueItem> {
            self.items.lock().unwrap().clone()
        }

        fn sorted_pending(items: &[QueueItem]) -> Vec<usize> {
            let mut idx: Vec<usize> = (0..items.len())
                .filter(|&i| items[i].status == QueueStatus::Pending)
                .collect();
            // Vec order is insertion order, so a stable sort keeps it as the final tie-break
            idx.sort_by(|&a, &b| {
                items[b]
                    .priority
                    .cmp(&items[a].priority)
                    .then(items[a].created_at.cmp(&items[b].created_at))
            });
            idx
        }
    }

    #[async_trait]
    impl QueueRepository for InMemoryQueueRepository {
        async fn enqueue(&self, item: &QueueItem) -> Result<EnqueueOutcome> {
            let mut items = self.items.lock().unwrap();
            let hash = item.content_hash.clone().unwrap_or_default();

            if let Some(existing) = items
                .iter()
                .find(|i| i.is_active() && i.platform == item.platform && i.content_hash.as_deref() == Some(hash.as_str()))
            {
                return Ok(EnqueueOutcome {
                    item_id: existing.id.clone(),
                    content_hash: hash,
                    duplicate: true,
                });
            }

            items.push(item.clone());
            Ok(EnqueueOutcome {
                item_id: item.id.clone(),
                content_hash: hash,
                duplicate: false,
            })
        }

        async fn dequeue_batch(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<QueueItem>> {
            let mut items = self.items.lock().unwrap();
            let due: Vec<usize> = Self::sorted_pending(&items)
                .into_iter()
                .filter(|&i| items[i].is_due(now))
                .take(limit as usize)
                .collect();

            let mut leased = Vec::with_capacity(due.len());
            for i in due {
                items[i].lease(now)?;
                leased.push(items[i].clone());
            }
            Ok(leased)
        }

        async fn mark_posted(&self, id: &str, now: DateTime<Utc>) -> Result<PostOutcome> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| AppError::NotFound(format!("queue item {}", id)))?;
            Ok(item.mark_posted(now)?)
        }

        async fn mark_failed(
            &self,
            id: &str,
            reason: &str,
            now: DateTime<Utc>,
            retry_at: Option<DateTime<Utc>>,
        ) -> Result<FailureOutcome> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| AppError::NotFound(format!("queue item {}", id)))?;
            Ok(item.mark_failed(reason, now, retry_at)?)
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>> {
            let items = self.items.lock().unwrap();
            Ok(items.iter().find(|i| i.id == id).cloned())
        }

        async fn status(&self) -> Result<QueueStatusReport> {
            let items = self.items.lock().unwrap();
            let mut report = QueueStatusReport::default();

            for item in items.iter() {
                *report
                    .status_counts
                    .entry(item.status.to_string())
                    .or_insert(0) += 1;
                if item.status == QueueStatus::Pending {
                    *report
                        .platform_distribution
                        .entry(item.platform.clone())
                        .or_insert(0) += 1;
                }
            }

            let mut failed: Vec<&QueueItem> = items
                .iter()
                .filter(|i| i.status == QueueStatus::Failed)
                .collect();
            failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            report.recent_failures = failed
                .into_iter()
                .take(RECENT_FAILURE_LIMIT)
                .map(|i| FailureSummary {
                    id: i.id.clone(),
                    platform: i.platform.clone(),
                    error_message: i.error_message.clone(),
                    retry_count: i.retry_count,
                })
                .collect();

            Ok(report)
        }

        async fn queue_position(&self, id: &str) -> Result<Option<u64>> {
            let items = self.items.lock().unwrap();
            Ok(Self::sorted_pending(&items)
                .into_iter()
                .position(|i| items[i].id == id)
                .map(|p| p as u64 + 1))
        }

        async fn find_stuck(&self, leased_before: DateTime<Utc>) -> Result<Vec<QueueItem>> {
            let items = self.items.lock().unwrap();
            Ok(items
                .iter()
                .filter(|i| {
                    i.status == QueueStatus::Processing
                        && i.updated_at.unwrap_or(i.created_at) < leased_before
                })
                .cloned()
                .collect())
        }
    }
}
