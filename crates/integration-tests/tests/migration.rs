//! Legacy store migration and consolidation

mod common;

use chrono::{TimeZone, Utc};
use common::{core_pool, open_storage, queue_harness};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use std::sync::Arc;
use unistore_core::application::{ConsolidationService, EnqueueRequest};
use unistore_core::domain::{content_hash, LogicalDatabase, QueueStatus, TableSkipReason};
use unistore_core::port::{Migrator, QueueRepository};
use unistore_infra_sqlite::{SqliteMigrator, SqliteQueueRepository};

async fn write_legacy(path: &Path, statements: &[&str]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    for statement in statements {
        sqlx::query(statement).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

/// Posting-queue store as the old producer left it
const LEGACY_POSTS: &[&str] = &[
    r#"CREATE TABLE content (
        id TEXT PRIMARY KEY, content TEXT NOT NULL, content_type TEXT,
        platform TEXT, content_hash TEXT UNIQUE, created_at TIMESTAMP
    )"#,
    r#"CREATE TABLE queue (
        id TEXT PRIMARY KEY, content_id TEXT, content TEXT NOT NULL, platform TEXT NOT NULL,
        status TEXT, priority INTEGER, scheduled_for TIMESTAMP, posted_at TIMESTAMP,
        retry_count INTEGER, max_retries INTEGER, error_message TEXT,
        created_at TIMESTAMP, approved_by TEXT
    )"#,
    r#"CREATE TABLE analytics (
        id INTEGER PRIMARY KEY, metric_type TEXT NOT NULL, metric_value REAL,
        platform TEXT, timestamp TIMESTAMP
    )"#,
    "CREATE TABLE approvals (id INTEGER PRIMARY KEY, queue_id TEXT, reviewer TEXT)",
    r#"INSERT INTO content (id, content, content_type, platform, created_at) VALUES
        ('c1', 'NIFTY closes higher', 'market_update', 'telegram', '2024-11-02 09:00:00'),
        ('c2', 'Weekly outlook', 'analysis', 'twitter', '2024-11-03 09:00:00')"#,
    r#"INSERT INTO queue (id, content_id, content, platform, status, priority, posted_at,
                          retry_count, max_retries, created_at, approved_by) VALUES
        ('q1', 'c1', 'NIFTY closes higher', 'telegram', 'posted', 1, '2024-11-02 10:00:00', 0, 3, '2024-11-02 09:05:00', 'ops'),
        ('q2', 'c2', 'Weekly outlook', 'twitter', 'approved', 0, NULL, 0, 3, '2024-11-03 09:05:00', 'ops'),
        ('q3', 'c2', 'Weekly outlook', 'telegram', 'pending', 0, NULL, 1, 3, '2024-11-03 09:06:00', NULL)"#,
    r#"INSERT INTO analytics (id, metric_type, metric_value, platform, timestamp) VALUES
        (1, 'posts_sent', 12, 'telegram', '2024-11-02 23:59:00'),
        (2, 'engagement_rate', 0.041, 'twitter', '2024-11-02 23:59:00')"#,
    "INSERT INTO approvals (queue_id, reviewer) VALUES ('q1', 'ops')",
];

/// Centralized posting queue: truncated hashes, ISO timestamps, a history table
fn posting_queue_store() -> Vec<String> {
    let hash = |content: &str| content_hash(content)[..16].to_string();
    vec![
        r#"CREATE TABLE queue (
            id TEXT PRIMARY KEY, content TEXT NOT NULL, platform TEXT NOT NULL,
            content_hash TEXT NOT NULL, priority INTEGER NOT NULL, status TEXT NOT NULL,
            created_at TEXT NOT NULL, scheduled_for TEXT, posted_at TEXT,
            retry_count INTEGER DEFAULT 0, max_retries INTEGER DEFAULT 3,
            source TEXT NOT NULL, metadata TEXT, error_message TEXT
        )"#
        .to_string(),
        r#"CREATE TABLE posting_history (
            id TEXT PRIMARY KEY, content_hash TEXT NOT NULL, platform TEXT NOT NULL,
            posted_at TEXT NOT NULL, source TEXT NOT NULL, success BOOLEAN NOT NULL
        )"#
        .to_string(),
        format!(
            r#"INSERT INTO queue (id, content, platform, content_hash, priority, status,
                                  created_at, scheduled_for, source, metadata) VALUES
                ('L1', 'Buy NIFTY', 'telegram', '{}', 2, 'pending',
                 '2025-01-06T08:00:00.000000', NULL, 'market_bot', '{{}}'),
                ('L2', 'Pre-open levels', 'telegram', '{}', 2, 'pending',
                 '2025-01-06T08:00:00.000000', '2025-01-06T10:00:00.000000', 'market_bot', NULL),
                ('L3', 'Closing wrap', 'telegram', '{}', 2, 'pending',
                 '2025-01-06T08:00:00.000000', '2025-01-06T15:00:00', 'market_bot', NULL)"#,
            hash("buy nifty"),
            hash("pre-open levels"),
            hash("closing wrap")
        ),
        format!(
            r#"INSERT INTO posting_history VALUES
                ('h1', '{}', 'telegram', '2025-01-05T16:00:00.000000', 'market_bot', 1)"#,
            hash("closing wrap")
        ),
    ]
}

#[tokio::test]
async fn test_posting_queue_store_rejoins_dedup_and_schedule() {
    let h = queue_harness().await;
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("posting_queue.db");
    let statements = posting_queue_store();
    let statements: Vec<&str> = statements.iter().map(String::as_str).collect();
    write_legacy(&source, &statements).await;

    let report = SqliteMigrator::new(&h.storage)
        .migrate_from(&source, LogicalDatabase::Core)
        .await
        .unwrap();
    assert_eq!(report.table("queue").unwrap().migrated, 3);
    assert_eq!(report.skipped_tables.len(), 1);
    assert_eq!(report.skipped_tables[0].table, "posting_history");
    assert_eq!(report.skipped_tables[0].reason, TableSkipReason::NotInSchema);
    let fixup = report.legacy_fixup.unwrap();
    assert_eq!(fixup.hashes_backfilled, 3);
    assert_eq!(fixup.conflicts, 0);
    assert!(report.legacy_fixup_error.is_none());

    // Same content from a new producer is recognised
    let outcome = h
        .service
        .enqueue(EnqueueRequest::new("Buy NIFTY", "telegram"))
        .await
        .unwrap();
    assert!(outcome.duplicate);
    assert_eq!(outcome.item_id, "L1");

    let scheduled: String =
        sqlx::query_scalar("SELECT CAST(scheduled_for AS TEXT) FROM queue WHERE id = 'L2'")
            .fetch_one(core_pool(&h.storage).sqlx_pool())
            .await
            .unwrap();
    assert_eq!(scheduled, "2025-01-06 10:00:00.000000");

    h.clock.set(Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap());
    let batch = h.service.dequeue_batch(10).await.unwrap();
    let mut ids: Vec<_> = batch.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["L1", "L2"]);
}

#[tokio::test]
async fn test_migrating_twice_only_finds_duplicates() {
    let (storage, dir) = open_storage(&[LogicalDatabase::Core]).await;
    let source = dir.path().join("legacy_posts.db");
    write_legacy(&source, LEGACY_POSTS).await;
    let migrator = SqliteMigrator::new(&storage);

    let first = migrator
        .migrate_from(&source, LogicalDatabase::Core)
        .await
        .unwrap();
    assert_eq!(first.total_attempted(), 7);
    assert_eq!(first.total_migrated(), 7);
    assert_eq!(first.table("queue").unwrap().dropped_columns, vec!["approved_by"]);
    assert_eq!(first.skipped_tables.len(), 1);
    assert_eq!(first.skipped_tables[0].table, "approvals");
    assert_eq!(first.skipped_tables[0].reason, TableSkipReason::NotInSchema);

    let second = migrator
        .migrate_from(&source, LogicalDatabase::Core)
        .await
        .unwrap();
    assert_eq!(second.total_migrated(), 0);
    assert_eq!(second.total_attempted(), 7);
    assert_eq!(second.total_skipped().duplicate, 7);
    assert_eq!(second.total_skipped().total(), 7);

    let pool = core_pool(&storage);
    for (table, expected) in [("content", 2i64), ("queue", 3), ("analytics", 2)] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool.sqlx_pool())
            .await
            .unwrap();
        assert_eq!(count, expected, "{} row count changed", table);
    }
}

#[tokio::test]
async fn test_migrated_queue_rows_join_the_live_queue() {
    let (storage, dir) = open_storage(&[LogicalDatabase::Core]).await;
    let source = dir.path().join("legacy_posts.db");
    write_legacy(&source, LEGACY_POSTS).await;

    let report = SqliteMigrator::new(&storage)
        .migrate_from(&source, LogicalDatabase::Core)
        .await
        .unwrap();
    let fixup = report.legacy_fixup.unwrap();
    assert_eq!(fixup.hashes_backfilled, 3);
    assert_eq!(fixup.statuses_mapped, 1);
    assert_eq!(fixup.conflicts, 0);

    let repo = SqliteQueueRepository::new(core_pool(&storage));
    let posted = repo.find_by_id("q1").await.unwrap().unwrap();
    assert_eq!(posted.status, QueueStatus::Posted);
    assert!(posted.posted_at.is_some());

    let approved = repo.find_by_id("q2").await.unwrap().unwrap();
    assert_eq!(approved.status, QueueStatus::Pending);
    assert!(approved.content_hash.is_some());

    let status = repo.status().await.unwrap();
    assert_eq!(status.total_pending(), 2);
    assert_eq!(status.total_posted(), 1);

    // Legacy pending rows are leased like any other
    let batch = repo.dequeue_batch(10, chrono::Utc::now()).await.unwrap();
    let mut ids: Vec<_> = batch.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["q2", "q3"]);
}

#[tokio::test]
async fn test_bad_rows_are_skipped_not_fatal() {
    let (storage, dir) = open_storage(&[LogicalDatabase::Social]).await;
    let source = dir.path().join("engagement_tracking.db");
    write_legacy(
        &source,
        &[
            "CREATE TABLE posts (id TEXT, platform TEXT, url TEXT, likes INTEGER)",
            r#"INSERT INTO posts VALUES
                ('p1', 'twitter', 'https://x.com/1', 10),
                ('p1', 'twitter', 'https://x.com/1-again', 11),
                ('p2', NULL, 'https://x.com/2', 3)"#,
            "CREATE TABLE engagement (post_id TEXT, action_type TEXT)",
            "INSERT INTO engagement VALUES ('p1', 'like'), ('ghost', 'share')",
            "CREATE TABLE followers (handle TEXT)",
            "INSERT INTO followers VALUES ('someone')",
        ],
    )
    .await;

    let report = SqliteMigrator::new(&storage)
        .migrate_from(&source, LogicalDatabase::Social)
        .await
        .unwrap();

    let posts = report.table("posts").unwrap();
    assert_eq!(posts.attempted, 3);
    assert_eq!(posts.migrated, 1);
    assert_eq!(posts.skipped.duplicate, 1);
    assert_eq!(posts.skipped.constraint_violation, 1);
    assert!(posts.defaulted_columns.contains(&"engagement_score".to_string()));

    // Foreign key to a post that never made it
    let engagement = report.table("engagement").unwrap();
    assert_eq!(engagement.migrated, 1);
    assert_eq!(engagement.skipped.constraint_violation, 1);

    let followers = report.table("followers").unwrap();
    assert_eq!(followers.skipped.schema_mismatch, 1);
    assert_eq!(followers.migrated, 0);
}

#[tokio::test]
async fn test_consolidation_records_missing_and_broken_sources() {
    let (storage, dir) = open_storage(&LogicalDatabase::ALL).await;
    let legacy = dir.path().join("legacy");

    write_legacy(&legacy.join("data").join("agency.db"), LEGACY_POSTS).await;
    write_legacy(
        &legacy.join("financial_data.db"),
        &[
            "CREATE TABLE market_data (id INTEGER PRIMARY KEY, symbol TEXT, price REAL, timestamp TIMESTAMP)",
            "INSERT INTO market_data VALUES (1, 'NIFTY', 22000.5, '2024-11-01 15:30:00')",
        ],
    )
    .await;
    std::fs::write(
        legacy.join("posting_queue.db"),
        "this is not a database at all\n".repeat(200),
    )
    .unwrap();

    let service = ConsolidationService::new(Arc::new(SqliteMigrator::new(&storage)), &legacy);
    let report = service.consolidate(&LogicalDatabase::ALL).await.unwrap();
    assert_eq!(report.databases.len(), 3);

    let core = &report.databases[0];
    assert_eq!(core.database, LogicalDatabase::Core);
    assert_eq!(core.migrated.len(), 1);
    assert_eq!(core.failed.len(), 1);
    assert!(core.failed[0].path.ends_with("posting_queue.db"));
    assert_eq!(core.missing.len(), 1);

    let social = &report.databases[1];
    assert!(social.migrated.is_empty());
    assert_eq!(social.missing.len(), 3);

    let market = &report.databases[2];
    assert_eq!(market.migrated.len(), 1);
    assert_eq!(market.migrated[0].total_migrated(), 1);

    assert_eq!(report.rows_migrated(), 8);

    // Second pass adds nothing
    let again = service.consolidate(&LogicalDatabase::ALL).await.unwrap();
    assert_eq!(again.rows_migrated(), 0);
}

#[tokio::test]
async fn test_unopenable_source_is_an_error() {
    let (storage, dir) = open_storage(&[LogicalDatabase::Core]).await;
    let err = SqliteMigrator::new(&storage)
        .migrate_from(&dir.path().join("missing.db"), LogicalDatabase::Core)
        .await
        .unwrap_err();
    assert_eq!(
        err.class(),
        unistore_core::error::ErrorClass::PermanentForProcess
    );
}
