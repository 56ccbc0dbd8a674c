// SQLite AnalyticsRepository Implementation

use crate::error::map_sqlx_error;
use crate::pool::ConnectionPool;
use crate::timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use unistore_core::domain::AnalyticsRecord;
use unistore_core::error::Result;
use unistore_core::port::AnalyticsRepository;

pub struct SqliteAnalyticsRepository {
    pool: ConnectionPool,
}

impl SqliteAnalyticsRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsRepository for SqliteAnalyticsRepository {
    async fn record(&self, record: &AnalyticsRecord) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO analytics (metric_type, metric_value, platform, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.metric_type)
        .bind(record.metric_value)
        .bind(&record.platform)
        .bind(timestamp::encode(record.timestamp))
        .bind(record.metadata.as_ref().map(|m| m.to_string()))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .last_insert_rowid();

        debug!(id, metric_type = %record.metric_type, "Analytics sample recorded");
        Ok(id)
    }

    async fn list_since(
        &self,
        since: DateTime<Utc>,
        metric_type: Option<&str>,
    ) -> Result<Vec<AnalyticsRecord>> {
        let mut conn = self.pool.acquire().await?;

        let rows: Vec<AnalyticsRow> = sqlx::query_as(
            r#"
            SELECT id,
                   CAST(metric_type AS TEXT) AS metric_type,
                   CAST(metric_value AS REAL) AS metric_value,
                   CAST(platform AS TEXT) AS platform,
                   CAST(timestamp AS TEXT) AS timestamp,
                   CAST(metadata AS TEXT) AS metadata
            FROM analytics
            WHERE timestamp >= ? AND (? IS NULL OR metric_type = ?)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(timestamp::encode(since))
        .bind(metric_type)
        .bind(metric_type)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AnalyticsRow::into_record).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnalyticsRow {
    id: i64,
    metric_type: Option<String>,
    metric_value: Option<f64>,
    platform: Option<String>,
    timestamp: Option<String>,
    metadata: Option<String>,
}

impl AnalyticsRow {
    fn into_record(self) -> AnalyticsRecord {
        AnalyticsRecord {
            id: Some(self.id),
            metric_type: self.metric_type.unwrap_or_default(),
            metric_value: self.metric_value,
            platform: self.platform,
            timestamp: timestamp::decode_opt(self.timestamp).unwrap_or_default(),
            metadata: self.metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        }
    }
}
