// SQLite QueueRepository Implementation

use crate::error::{is_unique_violation, map_sqlx_error};
use crate::pool::ConnectionPool;
use crate::timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use unistore_core::domain::status::{FailureSummary, RECENT_FAILURE_LIMIT};
use unistore_core::domain::{FailureOutcome, PostOutcome, QueueItem, QueueStatus, QueueStatusReport};
use unistore_core::error::{AppError, Result};
use unistore_core::port::{EnqueueOutcome, QueueRepository};

/// Columns selected for a full QueueItem
///
/// Legacy rows may carry NULLs or loosely typed values, hence the casts.
const QUEUE_COLUMNS: &str = r#"
    CAST(id AS TEXT) AS id,
    CAST(content_id AS TEXT) AS content_id,
    CAST(content AS TEXT) AS content,
    CAST(content_hash AS TEXT) AS content_hash,
    CAST(platform AS TEXT) AS platform,
    CAST(COALESCE(status, 'pending') AS TEXT) AS status,
    CAST(COALESCE(priority, 0) AS INTEGER) AS priority,
    CAST(scheduled_for AS TEXT) AS scheduled_for,
    CAST(posted_at AS TEXT) AS posted_at,
    CAST(COALESCE(retry_count, 0) AS INTEGER) AS retry_count,
    CAST(COALESCE(max_retries, 3) AS INTEGER) AS max_retries,
    CAST(error_message AS TEXT) AS error_message,
    CAST(source AS TEXT) AS source,
    CAST(metadata AS TEXT) AS metadata,
    CAST(created_at AS TEXT) AS created_at,
    CAST(updated_at AS TEXT) AS updated_at,
    rowid AS seq
"#;

/// Attempts of a compare-and-set transition before reporting a conflict
const MAX_TRANSITION_ATTEMPTS: usize = 3;

pub struct SqliteQueueRepository {
    pool: ConnectionPool,
}

impl SqliteQueueRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<QueueRow>> {
        let sql = format!("SELECT {} FROM queue WHERE id = ?", QUEUE_COLUMNS);
        sqlx::query_as::<_, QueueRow>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_active_duplicate(
        conn: &mut SqliteConnection,
        content_hash: &str,
        platform: &str,
    ) -> Result<Option<String>> {
        sqlx::query_scalar(
            r#"
            SELECT CAST(id AS TEXT) FROM queue
            WHERE content_hash = ? AND platform = ?
              AND status IN ('pending', 'processing')
            LIMIT 1
            "#,
        )
        .bind(content_hash)
        .bind(platform)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)
    }

    /// Write the fields a transition may change, only if the row is still
    /// in the state the transition was computed from
    async fn store_transition(
        conn: &mut SqliteConnection,
        before: &QueueItem,
        after: &QueueItem,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE queue
            SET status = ?, posted_at = ?, retry_count = ?, error_message = ?,
                scheduled_for = ?, updated_at = ?
            WHERE id = ? AND status = ? AND COALESCE(retry_count, 0) = ?
            "#,
        )
        .bind(after.status.as_str())
        .bind(timestamp::encode_opt(after.posted_at))
        .bind(after.retry_count)
        .bind(&after.error_message)
        .bind(timestamp::encode_opt(after.scheduled_for))
        .bind(timestamp::encode_opt(after.updated_at))
        .bind(&before.id)
        .bind(before.status.as_str())
        .bind(before.retry_count)
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    /// Load, apply a domain transition, store with compare-and-set
    async fn transition<T, F>(&self, id: &str, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut QueueItem) -> Result<Transition<T>> + Send,
        T: Send,
    {
        let mut conn = self.pool.acquire().await?;

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let before = Self::load(&mut conn, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("queue item {}", id)))?
                .into_item()?;

            let mut after = before.clone();
            match apply(&mut after)? {
                Transition::Unchanged(outcome) => return Ok(outcome),
                Transition::Changed(outcome) => {
                    if Self::store_transition(&mut conn, &before, &after).await? {
                        return Ok(outcome);
                    }
                    debug!(item_id = %id, attempt, "Queue item changed concurrently, reloading");
                }
            }
        }

        warn!(item_id = %id, "Queue item transition kept conflicting");
        Err(AppError::Conflict(format!(
            "queue item {} was modified concurrently",
            id
        )))
    }
}

enum Transition<T> {
    Unchanged(T),
    Changed(T),
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn enqueue(&self, item: &QueueItem) -> Result<EnqueueOutcome> {
        let content_hash = item
            .content_hash
            .clone()
            .ok_or_else(|| AppError::Validation("queue item has no content hash".to_string()))?;
        let now = timestamp::encode(item.created_at);
        let metadata = item.metadata.as_ref().map(|m| m.to_string());

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await.map_err(map_sqlx_error)?;

        // Writing first takes the database write lock for the whole transaction
        let content_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO content (id, content, content_type, platform, content_hash, created_at, updated_at, metadata)
            VALUES (?, ?, 'post', ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING CAST(id AS TEXT)
            "#,
        )
        .bind(item.content_id.as_deref().unwrap_or(item.id.as_str()))
        .bind(&item.content)
        .bind(&item.platform)
        .bind(&content_hash)
        .bind(&now)
        .bind(&now)
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(existing) =
            Self::find_active_duplicate(&mut tx, &content_hash, &item.platform).await?
        {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(EnqueueOutcome {
                item_id: existing,
                content_hash,
                duplicate: true,
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO queue (
                id, content_id, content, content_hash, platform, status, priority,
                scheduled_for, posted_at, retry_count, max_retries, error_message,
                source, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&content_id)
        .bind(&item.content)
        .bind(&content_hash)
        .bind(&item.platform)
        .bind(QueueStatus::Pending.as_str())
        .bind(item.priority)
        .bind(timestamp::encode_opt(item.scheduled_for))
        .bind(item.retry_count)
        .bind(item.max_retries)
        .bind(&item.source)
        .bind(&metadata)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(map_sqlx_error)?;
                Ok(EnqueueOutcome {
                    item_id: item.id.clone(),
                    content_hash,
                    duplicate: false,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.map_err(map_sqlx_error)?;
                let existing =
                    Self::find_active_duplicate(&mut conn, &content_hash, &item.platform).await?;
                match existing {
                    Some(existing) => Ok(EnqueueOutcome {
                        item_id: existing,
                        content_hash,
                        duplicate: true,
                    }),
                    None => Err(AppError::Conflict(format!(
                        "queue item {} collided with a row that is gone",
                        item.id
                    ))),
                }
            }
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn dequeue_batch(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<QueueItem>> {
        let now = timestamp::encode(now);
        let sql = format!(
            r#"
            UPDATE queue
            SET status = 'processing', updated_at = ?
            WHERE id IN (
                SELECT id FROM queue
                WHERE status = 'pending'
                  AND (scheduled_for IS NULL OR scheduled_for <= ?)
                ORDER BY priority DESC, created_at ASC, rowid ASC
                LIMIT ?
            )
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        );

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(&now)
            .bind(&now)
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        // RETURNING order is unspecified
        let mut rows = rows;
        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then(a.seq.cmp(&b.seq))
        });

        let items = rows
            .into_iter()
            .map(QueueRow::into_item)
            .collect::<Result<Vec<_>>>()?;

        if !items.is_empty() {
            debug!(count = items.len(), "Leased queue items");
        }
        Ok(items)
    }

    async fn mark_posted(&self, id: &str, now: DateTime<Utc>) -> Result<PostOutcome> {
        self.transition(id, |item| {
            Ok(match item.mark_posted(now)? {
                PostOutcome::AlreadyPosted => Transition::Unchanged(PostOutcome::AlreadyPosted),
                PostOutcome::Posted => Transition::Changed(PostOutcome::Posted),
            })
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        now: DateTime<Utc>,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<FailureOutcome> {
        self.transition(id, |item| {
            Ok(Transition::Changed(item.mark_failed(reason, now, retry_at)?))
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut conn, id)
            .await?
            .map(QueueRow::into_item)
            .transpose()
    }

    async fn status(&self) -> Result<QueueStatusReport> {
        let mut conn = self.pool.acquire().await?;

        let status_counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT CAST(COALESCE(status, 'pending') AS TEXT), COUNT(*) FROM queue GROUP BY 1",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let platform_counts: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT CAST(platform AS TEXT), COUNT(*) FROM queue
            WHERE status = 'pending'
            GROUP BY 1
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let failures: Vec<(String, String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT CAST(id AS TEXT), CAST(platform AS TEXT), CAST(error_message AS TEXT),
                   CAST(COALESCE(retry_count, 0) AS INTEGER)
            FROM queue
            WHERE status = 'failed'
            ORDER BY COALESCE(updated_at, created_at) DESC
            LIMIT ?
            "#,
        )
        .bind(RECENT_FAILURE_LIMIT as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(QueueStatusReport {
            status_counts: to_counts(status_counts),
            platform_distribution: to_counts(platform_counts),
            recent_failures: failures
                .into_iter()
                .map(|(id, platform, error_message, retry_count)| FailureSummary {
                    id,
                    platform,
                    error_message,
                    retry_count: retry_count as i32,
                })
                .collect(),
        })
    }

    async fn queue_position(&self, id: &str) -> Result<Option<u64>> {
        let mut conn = self.pool.acquire().await?;

        let anchor: Option<(i64, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT CAST(COALESCE(priority, 0) AS INTEGER), CAST(created_at AS TEXT), rowid
            FROM queue
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let Some((priority, created_at, seq)) = anchor else {
            return Ok(None);
        };

        let ahead: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM queue
            WHERE status = 'pending'
              AND (COALESCE(priority, 0) > ?1
                   OR (COALESCE(priority, 0) = ?1
                       AND (created_at < ?2 OR (created_at = ?2 AND rowid < ?3))))
            "#,
        )
        .bind(priority)
        .bind(created_at)
        .bind(seq)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(ahead as u64 + 1))
    }

    async fn find_stuck(&self, leased_before: DateTime<Utc>) -> Result<Vec<QueueItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM queue
            WHERE status = 'processing'
              AND COALESCE(updated_at, created_at) < ?
            ORDER BY COALESCE(updated_at, created_at) ASC
            "#,
            QUEUE_COLUMNS
        );

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(timestamp::encode(leased_before))
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(QueueRow::into_item).collect()
    }
}

fn to_counts(rows: Vec<(String, i64)>) -> BTreeMap<String, u64> {
    rows.into_iter()
        .map(|(key, count)| (key, count.max(0) as u64))
        .collect()
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    content_id: Option<String>,
    content: Option<String>,
    content_hash: Option<String>,
    platform: Option<String>,
    status: String,
    priority: i64,
    scheduled_for: Option<String>,
    posted_at: Option<String>,
    retry_count: i64,
    max_retries: i64,
    error_message: Option<String>,
    source: Option<String>,
    metadata: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    seq: i64,
}

impl QueueRow {
    fn into_item(self) -> Result<QueueItem> {
        let status: QueueStatus = self.status.parse()?;

        Ok(QueueItem {
            id: self.id,
            content_id: self.content_id,
            content: self.content.unwrap_or_default(),
            content_hash: self.content_hash,
            platform: self.platform.unwrap_or_default(),
            status,
            priority: self.priority as i32,
            scheduled_for: timestamp::decode_opt(self.scheduled_for),
            posted_at: timestamp::decode_opt(self.posted_at),
            retry_count: self.retry_count as i32,
            max_retries: self.max_retries as i32,
            error_message: self.error_message,
            source: self.source,
            metadata: self
                .metadata
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            created_at: timestamp::decode_opt(self.created_at).unwrap_or_default(),
            updated_at: timestamp::decode_opt(self.updated_at),
        })
    }
}
