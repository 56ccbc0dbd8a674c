// Shared setup for integration tests
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use unistore_core::application::QueueService;
use unistore_core::domain::LogicalDatabase;
use unistore_core::port::id_provider::UuidProvider;
use unistore_core::port::time_provider::mocks::ManualTimeProvider;
use unistore_core::port::QueueRepository;
use unistore_infra_sqlite::{ConnectionPool, PoolConfig, SqliteQueueRepository, Storage};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
}

/// Fresh unified databases in a temp dir
pub async fn open_storage(databases: &[LogicalDatabase]) -> (Storage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = PoolConfig {
        data_dir: dir.path().join("unified"),
        ..PoolConfig::default()
    };
    let storage = Storage::open(&config, databases).await.unwrap();
    (storage, dir)
}

pub fn core_pool(storage: &Storage) -> ConnectionPool {
    storage.pool(LogicalDatabase::Core).unwrap().clone()
}

pub struct QueueHarness {
    pub storage: Storage,
    pub repo: Arc<SqliteQueueRepository>,
    pub service: Arc<QueueService>,
    pub clock: Arc<ManualTimeProvider>,
    _dir: TempDir,
}

/// Core database with a queue service on a manual clock starting at `t0()`
pub async fn queue_harness() -> QueueHarness {
    let (storage, dir) = open_storage(&[LogicalDatabase::Core]).await;
    let repo = Arc::new(SqliteQueueRepository::new(core_pool(&storage)));
    let clock = Arc::new(ManualTimeProvider::new(t0()));
    let service = Arc::new(QueueService::new(
        repo.clone() as Arc<dyn QueueRepository>,
        Arc::new(UuidProvider),
        clock.clone(),
    ));
    QueueHarness {
        storage,
        repo,
        service,
        clock,
        _dir: dir,
    }
}
