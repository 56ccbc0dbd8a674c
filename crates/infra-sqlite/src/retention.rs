// SQLite Retention Implementation
use crate::error::map_sqlx_error;
use crate::pool::ConnectionPool;
use crate::schema::SchemaManager;
use crate::timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Connection, SqliteConnection};
use std::collections::BTreeMap;
use tracing::info;
use unistore_core::error::Result;
use unistore_core::port::{Retention, StorageStats, SweepReport};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Retention over one logical database
///
/// Queue and analytics sweeps are no-ops for databases without those tables.
pub struct SqliteRetention {
    pool: ConnectionPool,
}

impl SqliteRetention {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn has_table(&self, table: &str) -> bool {
        SchemaManager::unified_tables(self.pool.database()).contains(&table)
    }

    /// (size in bytes, free pages, total pages)
    async fn page_usage(conn: &mut SqliteConnection) -> Result<(i64, i64, i64)> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        let freelist: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok((page_count * page_size, freelist, page_count))
    }
}

#[async_trait]
impl Retention for SqliteRetention {
    async fn sweep(&self, older_than: Duration, now: DateTime<Utc>) -> Result<SweepReport> {
        if !self.has_table("queue") {
            return Ok(SweepReport::default());
        }
        let cutoff = timestamp::encode(now - older_than);

        info!(database = %self.pool.database(), cutoff = %cutoff, "Running queue sweep");

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await.map_err(map_sqlx_error)?;

        let posted = sqlx::query(
            r#"
            DELETE FROM queue
            WHERE status = 'posted'
              AND posted_at IS NOT NULL
              AND posted_at < ?
            "#,
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let failed = sqlx::query(
            r#"
            DELETE FROM queue
            WHERE status = 'failed'
              AND COALESCE(updated_at, created_at) < ?
            "#,
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let report = SweepReport {
            posted_deleted: posted.rows_affected(),
            failed_deleted: failed.rows_affected(),
        };
        info!(
            posted_deleted = report.posted_deleted,
            failed_deleted = report.failed_deleted,
            "Queue sweep completed"
        );
        Ok(report)
    }

    async fn sweep_analytics(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64> {
        if !self.has_table("analytics") {
            return Ok(0);
        }
        let cutoff = timestamp::encode(now - older_than);

        let mut conn = self.pool.acquire().await?;
        let deleted = sqlx::query("DELETE FROM analytics WHERE timestamp < ?")
            .bind(&cutoff)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        info!(deleted, cutoff = %cutoff, "Analytics sweep completed");
        Ok(deleted)
    }

    async fn vacuum(&self) -> Result<f64> {
        info!(database = %self.pool.database(), "Running VACUUM to optimize database...");

        let mut conn = self.pool.acquire().await?;
        let (size_before, _, _) = Self::page_usage(&mut conn).await?;

        sqlx::query("VACUUM")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let (size_after, _, _) = Self::page_usage(&mut conn).await?;
        let reclaimed = ((size_before - size_after) as f64 / BYTES_PER_MB).max(0.0);

        info!(
            size_before_mb = size_before as f64 / BYTES_PER_MB,
            size_after_mb = size_after as f64 / BYTES_PER_MB,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );
        Ok(reclaimed)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let database = self.pool.database();
        let mut conn = self.pool.acquire().await?;
        let (db_size_bytes, freelist, page_count) = Self::page_usage(&mut conn).await?;

        let mut tables = BTreeMap::new();
        for table in SchemaManager::unified_tables(database) {
            // Table names come from a fixed list
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            tables.insert(table.to_string(), count);
        }

        let fragmentation_percent = if page_count > 0 {
            freelist as f64 / page_count as f64 * 100.0
        } else {
            0.0
        };

        Ok(StorageStats {
            database: database.to_string(),
            db_size_bytes,
            db_size_mb: db_size_bytes as f64 / BYTES_PER_MB,
            fragmentation_percent,
            tables,
        })
    }
}
