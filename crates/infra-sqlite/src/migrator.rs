// Legacy Store Migrator
//
// Copies same-named tables from a legacy SQLite file into a unified database.
// Rows are inserted one by one inside a per-table transaction; constraint
// failures skip the row, storage failures roll back the table. Values bound for
// TIMESTAMP columns are rewritten to the unified text shape so SQL comparisons
// against them stay chronological.

use crate::error::{classify_row_error, map_open_error, map_sqlx_error, RowError};
use crate::pool::ConnectionPool;
use crate::schema::SchemaManager;
use crate::storage::Storage;
use crate::timestamp;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection, Row, SqliteConnection, TypeInfo, ValueRef};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};
use unistore_core::domain::{
    content_hash, LegacyQueueFixup, LogicalDatabase, MigrationReport, RowSkipReason,
    SkippedTable, TableReport, TableSkipReason,
};
use unistore_core::error::{AppError, Result};
use unistore_core::port::Migrator;

const DUPLICATE_OF_ACTIVE: &str = "duplicate of an active item";

/// Column correspondence between a source table and its unified table
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMapping {
    /// Copied columns, in source order
    pub shared: Vec<String>,
    /// Source-only columns
    pub dropped: Vec<String>,
    /// Target-only columns, left to schema defaults
    pub defaulted: Vec<String>,
    /// Per shared column: the target declares it TIMESTAMP
    pub timestamps: Vec<bool>,
}

impl ColumnMapping {
    pub fn compute(source: &[String], target: &[String]) -> Self {
        let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();
        let source_set: HashSet<&str> = source.iter().map(String::as_str).collect();

        let (shared, dropped): (Vec<String>, Vec<String>) = source
            .iter()
            .cloned()
            .partition(|c| target_set.contains(c.as_str()));
        let defaulted = target
            .iter()
            .filter(|c| !source_set.contains(c.as_str()))
            .cloned()
            .collect();

        Self {
            timestamps: vec![false; shared.len()],
            shared,
            dropped,
            defaulted,
        }
    }

    pub fn with_timestamp_columns(mut self, timestamp_columns: &[String]) -> Self {
        self.timestamps = self
            .shared
            .iter()
            .map(|c| timestamp_columns.contains(c))
            .collect();
        self
    }

    fn select_sql(&self, table: &str) -> String {
        format!(
            "SELECT {} FROM {}",
            quoted_list(&self.shared),
            quote_ident(table)
        )
    }

    fn insert_sql(&self, table: &str) -> String {
        let placeholders = vec!["?"; self.shared.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            quoted_list(&self.shared),
            placeholders
        )
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A source cell, carried with its storage class
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    fn read(row: &SqliteRow, index: usize) -> std::result::Result<Self, sqlx::Error> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let kind = raw.type_info().name().to_string();
        Ok(match kind.as_str() {
            "INTEGER" => SqlValue::Integer(row.try_get(index)?),
            "REAL" => SqlValue::Real(row.try_get(index)?),
            "BLOB" => SqlValue::Blob(row.try_get(index)?),
            _ => SqlValue::Text(row.try_get(index)?),
        })
    }

    /// Legacy text timestamps (`T`-separated, offset, no fraction) in the unified shape
    fn canonical_timestamp(self) -> Self {
        match self {
            SqlValue::Text(raw) => match timestamp::decode(&raw) {
                Some(at) => SqlValue::Text(timestamp::encode(at)),
                None => SqlValue::Text(raw),
            },
            other => other,
        }
    }
}

pub struct SqliteMigrator {
    targets: HashMap<LogicalDatabase, ConnectionPool>,
}

impl SqliteMigrator {
    /// Migrate into the databases opened by `storage`
    pub fn new(storage: &Storage) -> Self {
        let targets = storage
            .databases()
            .into_iter()
            .filter_map(|db| storage.pool(db).ok().map(|pool| (db, pool.clone())))
            .collect();
        Self { targets }
    }

    async fn open_source(path: &Path) -> Result<SqliteConnection> {
        if !path.is_file() {
            return Err(AppError::StorageUnavailable {
                path: path.display().to_string(),
                reason: "source file not found".to_string(),
            });
        }

        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| map_open_error(e, path))
    }

    async fn column_names(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> std::result::Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(conn)
            .await
    }

    async fn timestamp_columns(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> std::result::Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT name FROM pragma_table_info(?) WHERE upper(type) IN ('TIMESTAMP', 'DATETIME') ORDER BY cid",
        )
        .bind(table)
        .fetch_all(conn)
        .await
    }

    /// Read every mapped row of a source table
    async fn read_rows(
        source: &mut SqliteConnection,
        table: &str,
        mapping: &ColumnMapping,
    ) -> std::result::Result<Vec<Vec<SqlValue>>, sqlx::Error> {
        let rows = sqlx::query(&mapping.select_sql(table))
            .fetch_all(source)
            .await?;

        rows.iter()
            .map(|row| {
                (0..mapping.shared.len())
                    .map(|i| {
                        SqlValue::read(row, i).map(|value| {
                            if mapping.timestamps[i] {
                                value.canonical_timestamp()
                            } else {
                                value
                            }
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Insert rows in one transaction; a fatal error rolls the table back
    async fn copy_rows(
        target: &ConnectionPool,
        table: &str,
        mapping: &ColumnMapping,
        rows: Vec<Vec<SqlValue>>,
        report: &mut TableReport,
    ) -> Result<()> {
        let insert_sql = mapping.insert_sql(table);
        let mut conn = target.acquire().await?;
        let mut tx = conn.begin().await.map_err(map_sqlx_error)?;
        let mut migrated = 0u64;

        for values in rows {
            let mut query = sqlx::query(&insert_sql);
            for value in values {
                query = match value {
                    SqlValue::Null => query.bind(None::<String>),
                    SqlValue::Integer(v) => query.bind(v),
                    SqlValue::Real(v) => query.bind(v),
                    SqlValue::Text(v) => query.bind(v),
                    SqlValue::Blob(v) => query.bind(v),
                };
            }

            match query.execute(&mut *tx).await {
                Ok(_) => migrated += 1,
                Err(e) => match classify_row_error(e) {
                    RowError::Skip(reason) => {
                        debug!(table, ?reason, "Row skipped");
                        report.skipped.record(reason);
                    }
                    RowError::Fatal(err) => {
                        if let Err(e) = tx.rollback().await {
                            debug!(table, error = %e, "Rollback after fatal row error failed");
                        }
                        return Err(err);
                    }
                },
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        report.migrated = migrated;
        Ok(())
    }

    async fn migrate_table(
        source: &mut SqliteConnection,
        target: &ConnectionPool,
        table: &str,
    ) -> std::result::Result<TableReport, TableSkipReason> {
        let read_failed = |e: sqlx::Error| TableSkipReason::ReadFailed(e.to_string());

        let source_columns = Self::column_names(source, table).await.map_err(read_failed)?;
        let mut target_conn = target
            .acquire()
            .await
            .map_err(|e| TableSkipReason::ReadFailed(e.to_string()))?;
        let target_columns = Self::column_names(&mut target_conn, table)
            .await
            .map_err(read_failed)?;
        let target_timestamps = Self::timestamp_columns(&mut target_conn, table)
            .await
            .map_err(read_failed)?;
        drop(target_conn);

        let mapping = ColumnMapping::compute(&source_columns, &target_columns)
            .with_timestamp_columns(&target_timestamps);
        let mut report = TableReport::new(table);
        report.dropped_columns = mapping.dropped.clone();
        report.defaulted_columns = mapping.defaulted.clone();

        if mapping.shared.is_empty() {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
                .fetch_one(&mut *source)
                .await
                .map_err(read_failed)?;
            report.attempted = count.max(0) as u64;
            for _ in 0..report.attempted {
                report.skipped.record(RowSkipReason::SchemaMismatch);
            }
            warn!(table, rows = report.attempted, "No shared columns, rows skipped");
            return Ok(report);
        }

        let rows = Self::read_rows(source, table, &mapping)
            .await
            .map_err(read_failed)?;
        report.attempted = rows.len() as u64;

        if let Err(e) = Self::copy_rows(target, table, &mapping, rows, &mut report).await {
            warn!(table, error = %e, "Table migration aborted, rolled back");
            report.migrated = 0;
            report.aborted = Some(e.to_string());
        }

        info!(
            table,
            attempted = report.attempted,
            migrated = report.migrated,
            skipped = report.skipped.total(),
            dropped_columns = report.dropped_columns.len(),
            "Table migrated"
        );
        Ok(report)
    }

    /// Normalize legacy queue rows so they obey the unified state machine
    async fn fix_legacy_queue(target: &ConnectionPool) -> Result<LegacyQueueFixup> {
        let mut conn = target.acquire().await?;
        let mut fixup = LegacyQueueFixup::default();

        // Legacy producers stored truncated SHA-256 or MD5 digests; those never
        // match a fresh enqueue of the same content
        let rows: Vec<(String, Option<String>, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT CAST(id AS TEXT), CAST(content AS TEXT), CAST(content_hash AS TEXT),
                   CAST(status AS TEXT)
            FROM queue
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        for (id, content, stored_hash, status) in rows {
            let unified = content_hash(content.as_deref().unwrap_or_default());
            if stored_hash.as_deref() == Some(unified.as_str()) {
                continue;
            }

            let updated = sqlx::query("UPDATE OR IGNORE queue SET content_hash = ? WHERE id = ?")
                .bind(&unified)
                .bind(&id)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            if updated.rows_affected() == 1 {
                fixup.hashes_backfilled += 1;
                continue;
            }

            // Only an active row can collide: another active row holds this content
            warn!(item_id = %id, status = %status, "Legacy item duplicates an active item");
            sqlx::query(
                r#"
                UPDATE queue
                SET status = 'failed', content_hash = ?, error_message = ?
                WHERE id = ?
                "#,
            )
            .bind(&unified)
            .bind(DUPLICATE_OF_ACTIVE)
            .bind(&id)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            fixup.conflicts += 1;
        }

        let approved = sqlx::query("UPDATE OR IGNORE queue SET status = 'pending' WHERE status = 'approved'")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        fixup.statuses_mapped += approved.rows_affected();

        // Left behind: an active row already holds the same content
        let still_approved: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE status = 'approved'")
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
        fixup.conflicts += still_approved.max(0) as u64;

        let rejected = sqlx::query(
            "UPDATE queue SET status = 'failed' WHERE status IN ('rejected', 'duplicate')",
        )
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        fixup.statuses_mapped += rejected.rows_affected();

        // posted_at is set exactly when status is posted
        sqlx::query(
            r#"
            UPDATE queue SET posted_at = COALESCE(updated_at, created_at)
            WHERE status = 'posted' AND posted_at IS NULL
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        sqlx::query("UPDATE queue SET posted_at = NULL WHERE status <> 'posted' AND posted_at IS NOT NULL")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        info!(
            hashes_backfilled = fixup.hashes_backfilled,
            statuses_mapped = fixup.statuses_mapped,
            conflicts = fixup.conflicts,
            "Legacy queue rows normalized"
        );
        Ok(fixup)
    }
}

#[async_trait]
impl Migrator for SqliteMigrator {
    async fn migrate_from(&self, source: &Path, target: LogicalDatabase) -> Result<MigrationReport> {
        let pool = self.targets.get(&target).ok_or_else(|| {
            AppError::Config(format!("logical database '{}' is not open", target))
        })?;

        info!(source = %source.display(), target = %target, "Migrating legacy store");
        let mut conn = Self::open_source(source).await?;

        let source_tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(|e| map_open_error(e, source))?;

        let unified = SchemaManager::unified_tables(target);
        let mut report = MigrationReport::new(source.display().to_string(), target);

        for table in &source_tables {
            if !unified.contains(&table.as_str()) {
                debug!(table = %table, "Table not in unified schema");
                report.skipped_tables.push(SkippedTable {
                    table: table.clone(),
                    reason: TableSkipReason::NotInSchema,
                });
            }
        }

        // Unified order puts referenced tables first
        for table in unified.iter().filter(|t| source_tables.iter().any(|s| s == *t)) {
            match Self::migrate_table(&mut conn, pool, table).await {
                Ok(table_report) => report.tables.push(table_report),
                Err(reason) => {
                    warn!(table, ?reason, "Source table skipped");
                    report.skipped_tables.push(SkippedTable {
                        table: table.to_string(),
                        reason,
                    });
                }
            }
        }

        let queue_copied = report
            .table("queue")
            .map_or(false, |t| t.aborted.is_none());
        if target == LogicalDatabase::Core && queue_copied {
            match Self::fix_legacy_queue(pool).await {
                Ok(fixup) => report.legacy_fixup = Some(fixup),
                Err(e) => {
                    warn!(error = %e, "Legacy queue fix-up failed, copied rows kept");
                    report.legacy_fixup_error = Some(e.to_string());
                }
            }
        }

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Closing source connection failed");
        }

        info!(
            source = %report.source,
            target = %target,
            attempted = report.total_attempted(),
            migrated = report.total_migrated(),
            skipped = report.total_skipped().total(),
            skipped_tables = report.skipped_tables.len(),
            "Migration completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_repository::SqliteQueueRepository;
    use crate::test_support::temp_storage;
    use chrono::{TimeZone, Utc};
    use unistore_core::domain::{QueueItem, QueueStatus};
    use unistore_core::error::ErrorClass;
    use unistore_core::port::QueueRepository;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Legacy posting-queue file: an extra column, a legacy status, a table
    /// unknown to the unified schema and an analytics table of another shape
    async fn legacy_store(path: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();

        for statement in [
            r#"CREATE TABLE queue (
                id TEXT PRIMARY KEY, content TEXT, platform TEXT, status TEXT,
                priority INTEGER, created_at TIMESTAMP, legacy_flag INTEGER
            )"#,
            r#"INSERT INTO queue VALUES
                ('q1', 'Morning update', 'telegram', 'approved', 5, '2024-12-01 10:00:00', 1),
                ('q2', 'Market closed', 'twitter', 'posted', 0, '2024-12-01 11:00:00', 0),
                ('q3', 'Bad take', 'twitter', 'rejected', 0, '2024-12-01 12:00:00', 0)"#,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            "INSERT INTO users (name) VALUES ('ops')",
            "CREATE TABLE analytics (foo TEXT, bar REAL)",
            "INSERT INTO analytics VALUES ('x', 1.5), ('y', 2.5)",
        ] {
            sqlx::query(statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    async fn write_source(path: &Path, statements: &[&str]) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    #[test]
    fn test_column_mapping() {
        let mapping = ColumnMapping::compute(
            &names(&["id", "content", "legacy_flag"]),
            &names(&["id", "content", "content_hash"]),
        );
        assert_eq!(mapping.shared, names(&["id", "content"]));
        assert_eq!(mapping.dropped, names(&["legacy_flag"]));
        assert_eq!(mapping.defaulted, names(&["content_hash"]));
        assert_eq!(
            mapping.insert_sql("queue"),
            r#"INSERT INTO "queue" ("id", "content") VALUES (?, ?)"#
        );

        let mapping = ColumnMapping::compute(
            &names(&["id", "created_at", "content"]),
            &names(&["id", "content", "created_at"]),
        )
        .with_timestamp_columns(&names(&["created_at", "posted_at"]));
        assert_eq!(mapping.timestamps, vec![false, true, false]);
    }

    #[test]
    fn test_canonical_timestamp() {
        let iso = SqlValue::Text("2025-01-06T10:00:00".to_string());
        assert_eq!(
            iso.canonical_timestamp(),
            SqlValue::Text("2025-01-06 10:00:00.000000".to_string())
        );

        let offset = SqlValue::Text("2025-01-06T10:00:00+05:30".to_string());
        assert_eq!(
            offset.canonical_timestamp(),
            SqlValue::Text("2025-01-06 04:30:00.000000".to_string())
        );

        let unparsed = SqlValue::Text("last tuesday".to_string());
        assert_eq!(unparsed.clone().canonical_timestamp(), unparsed);
        assert_eq!(SqlValue::Null.canonical_timestamp(), SqlValue::Null);
    }

    #[tokio::test]
    async fn test_migrate_legacy_queue() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let source = dir.path().join("posting_queue.db");
        legacy_store(&source).await;

        let migrator = SqliteMigrator::new(&storage);
        let report = migrator
            .migrate_from(&source, LogicalDatabase::Core)
            .await
            .unwrap();

        let queue = report.table("queue").unwrap();
        assert_eq!(queue.attempted, 3);
        assert_eq!(queue.migrated, 3);
        assert_eq!(queue.dropped_columns, names(&["legacy_flag"]));
        assert!(queue.defaulted_columns.contains(&"content_hash".to_string()));

        let analytics = report.table("analytics").unwrap();
        assert_eq!(analytics.migrated, 0);
        assert_eq!(analytics.skipped.schema_mismatch, 2);

        assert_eq!(report.skipped_tables.len(), 1);
        assert_eq!(report.skipped_tables[0].table, "users");
        assert_eq!(report.skipped_tables[0].reason, TableSkipReason::NotInSchema);

        let fixup = report.legacy_fixup.clone().unwrap();
        assert_eq!(fixup.hashes_backfilled, 3);
        assert_eq!(fixup.statuses_mapped, 2);
        assert_eq!(fixup.conflicts, 0);

        let pool = storage.pool(LogicalDatabase::Core).unwrap();
        let rows: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT id, status, content_hash, CAST(posted_at AS TEXT) FROM queue ORDER BY id",
        )
        .fetch_all(pool.sqlx_pool())
        .await
        .unwrap();
        assert_eq!(rows[0].1, QueueStatus::Pending.as_str());
        assert_eq!(rows[0].2.as_deref(), Some(content_hash("Morning update").as_str()));
        assert_eq!(rows[1].1, "posted");
        assert!(rows[1].3.is_some());
        assert_eq!(rows[2].1, "failed");
    }

    #[tokio::test]
    async fn test_second_run_only_finds_duplicates() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let source = dir.path().join("posting_queue.db");
        legacy_store(&source).await;
        let migrator = SqliteMigrator::new(&storage);

        migrator.migrate_from(&source, LogicalDatabase::Core).await.unwrap();
        let again = migrator.migrate_from(&source, LogicalDatabase::Core).await.unwrap();

        let queue = again.table("queue").unwrap();
        assert_eq!(queue.migrated, 0);
        assert_eq!(queue.skipped.duplicate, 3);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue")
            .fetch_one(storage.pool(LogicalDatabase::Core).unwrap().sqlx_pool())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_constraint_violations_skip_rows() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Market]).await;
        let source = dir.path().join("financial_data.db");
        let options = SqliteConnectOptions::new()
            .filename(&source)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE market_data (id INTEGER PRIMARY KEY, symbol TEXT, price REAL)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO market_data VALUES (1, 'NIFTY', 22000.5), (2, NULL, 1.0), (3, 'SENSEX', 72000.0)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();

        let report = SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Market)
            .await
            .unwrap();

        let table = report.table("market_data").unwrap();
        assert_eq!(table.attempted, 3);
        assert_eq!(table.migrated, 2);
        assert_eq!(table.skipped.constraint_violation, 1);
        assert!(table.aborted.is_none());
        assert!(report.legacy_fixup.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_storage_unavailable() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let err = SqliteMigrator::new(&storage)
            .migrate_from(&dir.path().join("gone.db"), LogicalDatabase::Core)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::PermanentForProcess);
    }

    #[tokio::test]
    async fn test_unopened_target_is_config_error() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let source = dir.path().join("posting_queue.db");
        legacy_store(&source).await;

        let err = SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Social)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
    #[tokio::test]
    async fn test_legacy_timestamps_are_rewritten() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let source = dir.path().join("posting_queue.db");
        write_source(
            &source,
            &[
                r#"CREATE TABLE queue (
                    id TEXT PRIMARY KEY, content TEXT NOT NULL, platform TEXT NOT NULL,
                    status TEXT NOT NULL, created_at TEXT NOT NULL, scheduled_for TEXT
                )"#,
                r#"INSERT INTO queue VALUES
                    ('L1', 'Lunch update', 'telegram', 'pending', '2025-01-06T08:15:30.250000', '2025-01-06T10:00:00')"#,
            ],
        )
        .await;

        SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Core)
            .await
            .unwrap();

        let pool = storage.pool(LogicalDatabase::Core).unwrap();
        let (created_at, scheduled_for): (String, String) = sqlx::query_as(
            "SELECT CAST(created_at AS TEXT), CAST(scheduled_for AS TEXT) FROM queue WHERE id = 'L1'",
        )
        .fetch_one(pool.sqlx_pool())
        .await
        .unwrap();
        assert_eq!(created_at, "2025-01-06 08:15:30.250000");
        assert_eq!(scheduled_for, "2025-01-06 10:00:00.000000");

        let repo = SqliteQueueRepository::new(pool.clone());
        let noon = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let leased = repo.dequeue_batch(5, noon).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].id, "L1");
    }

    #[tokio::test]
    async fn test_legacy_duplicate_of_active_item_is_failed() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let pool = storage.pool(LogicalDatabase::Core).unwrap().clone();
        let repo = SqliteQueueRepository::new(pool.clone());
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        repo.enqueue(&QueueItem::new(
            "live",
            now,
            "Buy NIFTY",
            content_hash("Buy NIFTY"),
            "telegram",
        ))
        .await
        .unwrap();

        let source = dir.path().join("posting_queue.db");
        let truncated = &content_hash("buy nifty")[..16];
        let insert = format!(
            "INSERT INTO queue VALUES ('L1', 'Buy NIFTY', '{}', 'telegram', 'pending')",
            truncated
        );
        write_source(
            &source,
            &[
                r#"CREATE TABLE queue (
                    id TEXT PRIMARY KEY, content TEXT NOT NULL, content_hash TEXT NOT NULL,
                    platform TEXT NOT NULL, status TEXT NOT NULL
                )"#,
                &insert,
            ],
        )
        .await;

        let report = SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Core)
            .await
            .unwrap();
        let fixup = report.legacy_fixup.unwrap();
        assert_eq!(fixup.hashes_backfilled, 0);
        assert_eq!(fixup.conflicts, 1);

        let legacy = repo.find_by_id("L1").await.unwrap().unwrap();
        assert_eq!(legacy.status, QueueStatus::Failed);
        assert_eq!(legacy.content_hash.as_deref(), Some(content_hash("Buy NIFTY").as_str()));
        assert_eq!(legacy.error_message.as_deref(), Some(DUPLICATE_OF_ACTIVE));
        assert_eq!(repo.status().await.unwrap().total_pending(), 1);
    }

    #[tokio::test]
    async fn test_fixup_failure_is_reported_not_raised() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let pool = storage.pool(LogicalDatabase::Core).unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER queue_frozen BEFORE UPDATE ON queue
            BEGIN SELECT RAISE(ABORT, 'queue is frozen'); END
            "#,
        )
        .execute(pool.sqlx_pool())
        .await
        .unwrap();

        let source = dir.path().join("posting_queue.db");
        legacy_store(&source).await;

        let report = SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Core)
            .await
            .unwrap();

        assert_eq!(report.table("queue").unwrap().migrated, 3);
        assert!(report.legacy_fixup.is_none());
        assert!(report.legacy_fixup_error.is_some());
    }
    #[tokio::test]
    async fn test_fatal_row_error_rolls_back_table() {
        let (storage, dir) = temp_storage(&[LogicalDatabase::Core]).await;
        let pool = storage.pool(LogicalDatabase::Core).unwrap();
        // Resolved only when the trigger fires, so every insert hits a plain SQL error
        sqlx::query(
            r#"
            CREATE TRIGGER queue_audit AFTER INSERT ON queue
            BEGIN INSERT INTO queue_audit (queue_id) VALUES (new.id); END
            "#,
        )
        .execute(pool.sqlx_pool())
        .await
        .unwrap();

        let source = dir.path().join("posting_queue.db");
        legacy_store(&source).await;

        let report = SqliteMigrator::new(&storage)
            .migrate_from(&source, LogicalDatabase::Core)
            .await
            .unwrap();

        let queue = report.table("queue").unwrap();
        assert!(queue.aborted.is_some());
        assert_eq!(queue.migrated, 0);
        assert!(report.legacy_fixup.is_none());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue")
            .fetch_one(pool.sqlx_pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
