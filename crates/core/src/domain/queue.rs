// Queue Item Domain Model
//
// State machine: pending -> processing -> { posted | pending (retry) | failed }

use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Queue item ID (UUID v4)
pub type ItemId = String;

/// Priority (higher number = dequeued earlier)
pub type Priority = i32;

/// Retries granted to an item when the producer does not choose
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Posted,
    Failed,
}

impl QueueStatus {
    /// States that participate in duplicate suppression
    pub const ACTIVE: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Posted => "posted",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Posted | QueueStatus::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "posted" => Ok(QueueStatus::Posted),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Result of reporting a delivery failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Back to pending, eligible again at `retry_at` (immediately if `None`)
    Requeued {
        retry_count: i32,
        retry_at: Option<DateTime<Utc>>,
    },
    /// Terminal; only retention removes the row from here
    Failed { retry_count: i32 },
}

/// Result of reporting a successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOutcome {
    Posted,
    AlreadyPosted,
}

/// Queue item entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub content_id: Option<String>,
    pub content: String,
    pub content_hash: Option<String>,
    pub platform: String,

    pub status: QueueStatus,
    pub priority: Priority,

    pub scheduled_for: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,

    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,

    /// Producer tag (news_monitor, manual, ...)
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    /// Last transition time; doubles as lease start while processing
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Create a new pending item
    ///
    /// ID and timestamp are injected so callers control determinism.
    pub fn new(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        content: impl Into<String>,
        content_hash: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content_id: None,
            content: content.into(),
            content_hash: Some(content_hash.into()),
            platform: platform.into(),
            status: QueueStatus::Pending,
            priority: 0,
            scheduled_for: None,
            posted_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
            source: None,
            metadata: None,
            created_at,
            updated_at: Some(created_at),
        }
    }

    /// Whether this item counts toward the duplicate check
    pub fn is_active(&self) -> bool {
        QueueStatus::ACTIVE.contains(&self.status)
    }

    /// Whether a dequeue at `now` may lease this item
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.scheduled_for.map_or(true, |at| at <= now)
    }

    /// pending -> processing
    pub fn lease(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != QueueStatus::Pending {
            return Err(self.invalid_transition(QueueStatus::Processing));
        }
        self.status = QueueStatus::Processing;
        self.updated_at = Some(now);
        Ok(())
    }

    /// processing -> posted
    ///
    /// Already-posted items are left untouched so `posted_at` keeps its first value.
    pub fn mark_posted(&mut self, now: DateTime<Utc>) -> Result<PostOutcome> {
        match self.status {
            QueueStatus::Posted => Ok(PostOutcome::AlreadyPosted),
            QueueStatus::Processing => {
                self.status = QueueStatus::Posted;
                self.posted_at = Some(now);
                self.updated_at = Some(now);
                self.error_message = None;
                Ok(PostOutcome::Posted)
            }
            _ => Err(self.invalid_transition(QueueStatus::Posted)),
        }
    }

    /// processing -> pending (retry) | failed
    ///
    /// An item is re-queued `max_retries` times; the failure after that is terminal.
    /// `retry_count` never exceeds `max_retries` once persisted.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<FailureOutcome> {
        match self.status {
            QueueStatus::Processing => {}
            QueueStatus::Failed => return Err(DomainError::RetriesExhausted(self.id.clone())),
            _ => return Err(self.invalid_transition(QueueStatus::Failed)),
        }

        let attempted = self.retry_count + 1;
        self.error_message = Some(reason.into());
        self.updated_at = Some(now);

        if attempted > self.max_retries {
            self.status = QueueStatus::Failed;
            self.retry_count = self.max_retries.max(0);
            return Ok(FailureOutcome::Failed {
                retry_count: self.retry_count,
            });
        }

        self.status = QueueStatus::Pending;
        self.retry_count = attempted;
        if retry_at.is_some() {
            self.scheduled_for = retry_at;
        }
        Ok(FailureOutcome::Requeued {
            retry_count: attempted,
            retry_at,
        })
    }

    fn invalid_transition(&self, to: QueueStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
