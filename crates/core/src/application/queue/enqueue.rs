// Enqueue Use Case

use crate::domain::queue::DEFAULT_MAX_RETRIES;
use crate::domain::{content_hash, DomainError, QueueItem};
use crate::error::{AppError, Result};
use crate::port::{EnqueueOutcome, IdProvider, QueueRepository, TimeProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MIN_PRIORITY: i32 = -100;
pub const MAX_PRIORITY: i32 = 100;
pub const MAX_PLATFORM_LEN: usize = 32;
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;
pub const MAX_RETRIES_LIMIT: i32 = 20;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub content: String,
    pub platform: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Producer tag, e.g. `news_monitor`
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,

    #[serde(default)]
    pub max_retries: Option<i32>,
}

impl EnqueueRequest {
    pub fn new(content: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            platform: platform.into(),
            priority: 0,
            scheduled_for: None,
            source: None,
            metadata: None,
            max_retries: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Validate an enqueue request before touching storage
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("Content cannot be empty".to_string()));
    }
    if req.content.len() > MAX_CONTENT_BYTES {
        return Err(AppError::Validation(format!(
            "Content too long: {} bytes (max {})",
            req.content.len(),
            MAX_CONTENT_BYTES
        )));
    }

    if req.platform.is_empty() {
        return Err(AppError::Validation("Platform cannot be empty".to_string()));
    }
    if req.platform.len() > MAX_PLATFORM_LEN {
        return Err(AppError::Validation(format!(
            "Platform name too long: {} (max {})",
            req.platform.len(),
            MAX_PLATFORM_LEN
        )));
    }
    if !req
        .platform
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(format!(
            "Platform must be alphanumeric with '_' or '-': {}",
            req.platform
        )));
    }

    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&req.priority) {
        return Err(DomainError::InvalidPriority(req.priority).into());
    }

    if let Some(max_retries) = req.max_retries {
        if !(0..=MAX_RETRIES_LIMIT).contains(&max_retries) {
            return Err(AppError::Validation(format!(
                "max_retries out of range: {} (0..={})",
                max_retries, MAX_RETRIES_LIMIT
            )));
        }
    }

    Ok(())
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `queue_repo` - Queue repository (dedup happens inside its transaction)
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Enqueue request
pub async fn execute(
    queue_repo: &dyn QueueRepository,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: EnqueueRequest,
) -> Result<EnqueueOutcome> {
    validate_request(&req)?;

    let hash = content_hash(&req.content);
    let now = time_provider.now();

    let mut item = QueueItem::new(
        id_provider.generate_id(),
        now,
        req.content,
        hash,
        req.platform,
    );
    item.content_id = Some(id_provider.generate_id());
    item.priority = req.priority;
    item.scheduled_for = req.scheduled_for;
    item.source = req.source;
    item.metadata = req.metadata;
    item.max_retries = req.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

    let outcome = queue_repo.enqueue(&item).await?;

    if outcome.duplicate {
        debug!(
            item_id = %outcome.item_id,
            platform = %item.platform,
            content_hash = %outcome.content_hash,
            "Duplicate content already queued"
        );
    } else {
        info!(
            item_id = %outcome.item_id,
            platform = %item.platform,
            priority = item.priority,
            "Item enqueued"
        );
    }

    Ok(outcome)
}
