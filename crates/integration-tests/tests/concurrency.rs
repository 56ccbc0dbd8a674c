//! Concurrent producers and workers against one core database
//!
//! Correctness comes from SQLite transactions and the active-dedup index, so
//! these run on a multi-threaded runtime with several pooled connections.

mod common;

use chrono::Duration;
use common::{core_pool, queue_harness, t0};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use unistore_core::application::EnqueueRequest;
use unistore_core::domain::{content_hash, LogicalDatabase, QueueItem, QueueStatus};
use unistore_core::error::AppError;
use unistore_core::port::QueueRepository;
use unistore_infra_sqlite::{PoolConfig, SqliteQueueRepository, Storage};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_leases_each_item_once() {
    let h = queue_harness().await;
    for i in 0..30 {
        h.service
            .enqueue(EnqueueRequest::new(format!("post {}", i), "telegram"))
            .await
            .unwrap();
    }

    let now = t0() + Duration::minutes(1);
    let workers = (0..6).map(|_| {
        let repo = h.repo.clone();
        tokio::spawn(async move {
            let mut leased = Vec::new();
            loop {
                let batch = repo.dequeue_batch(4, now).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                leased.extend(batch.into_iter().map(|item| item.id));
                tokio::task::yield_now().await;
            }
            leased
        })
    });

    let mut all = Vec::new();
    for result in join_all(workers).await {
        all.extend(result.unwrap());
    }

    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), 30, "every item leased");
    assert_eq!(unique.len(), 30, "no item leased twice");

    let status = h.service.status().await.unwrap();
    assert_eq!(status.count(QueueStatus::Processing), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_enqueue_inserts_once() {
    let h = queue_harness().await;

    let producers = (0..8).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move {
            service
                .enqueue(EnqueueRequest::new("Buy NIFTY", "telegram"))
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<_> = join_all(producers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let inserted: Vec<_> = outcomes.iter().filter(|o| !o.duplicate).collect();
    assert_eq!(inserted.len(), 1);
    assert!(outcomes.iter().all(|o| o.item_id == inserted[0].item_id));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE content_hash = ?")
        .bind(content_hash("Buy NIFTY"))
        .fetch_one(core_pool(&h.storage).sqlx_pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let content_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content")
        .fetch_one(core_pool(&h.storage).sqlx_pool())
        .await
        .unwrap();
    assert_eq!(content_rows, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_and_workers() {
    let h = queue_harness().await;

    let producers = (0..4).map(|p| {
        let service = h.service.clone();
        tokio::spawn(async move {
            for i in 0..10 {
                service
                    .enqueue(EnqueueRequest::new(format!("producer {} item {}", p, i), "discord"))
                    .await
                    .unwrap();
            }
        })
    });
    for result in join_all(producers).await {
        result.unwrap();
    }

    let workers = (0..4).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move {
            let mut posted: Vec<QueueItem> = Vec::new();
            loop {
                let batch = service.dequeue_batch(3).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                for item in batch {
                    service.mark_posted(&item.id).await.unwrap();
                    posted.push(item);
                }
            }
            posted.len()
        })
    });
    let posted: usize = join_all(workers).await.into_iter().map(|r| r.unwrap()).sum();

    assert_eq!(posted, 40);
    let status = h.service.status().await.unwrap();
    assert_eq!(status.total_posted(), 40);
    assert_eq!(status.total_pending(), 0);
}

/// A producer that cannot get a connection gets a transient error and nothing is lost
#[tokio::test]
async fn test_pool_exhaustion_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let config = PoolConfig {
        data_dir: dir.path().to_path_buf(),
        max_connections: 1,
        acquire_timeout_ms: 100,
        ..PoolConfig::default()
    };
    let storage = Storage::open(&config, &[LogicalDatabase::Core]).await.unwrap();
    let pool = storage.pool(LogicalDatabase::Core).unwrap().clone();
    let repo = Arc::new(SqliteQueueRepository::new(pool.clone()));

    let item = QueueItem::new("item-1", t0(), "Held up", content_hash("Held up"), "telegram");

    let held = pool.acquire().await.unwrap();
    let err = repo.enqueue(&item).await.unwrap_err();
    assert!(matches!(err, AppError::PoolTimeout { .. }));
    assert!(err.is_transient());
    drop(held);

    let outcome = repo.enqueue(&item).await.unwrap();
    assert!(!outcome.duplicate);
    assert_eq!(repo.status().await.unwrap().total_pending(), 1);
}
