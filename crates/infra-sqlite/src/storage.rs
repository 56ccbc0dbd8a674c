// Storage registry - one pool per logical database, built once at startup

use crate::config::PoolConfig;
use crate::pool::ConnectionPool;
use crate::schema::SchemaManager;
use std::collections::HashMap;
use tracing::info;
use unistore_core::domain::LogicalDatabase;
use unistore_core::error::{AppError, Result};

/// Opened logical databases
///
/// Passed by reference to whatever needs storage; there is no global instance.
pub struct Storage {
    config: PoolConfig,
    pools: HashMap<LogicalDatabase, ConnectionPool>,
}

impl Storage {
    /// Open each database and ensure its schema before anything else uses it
    ///
    /// Fails on the first database that cannot be opened.
    pub async fn open(config: &PoolConfig, databases: &[LogicalDatabase]) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| AppError::StorageUnavailable {
            path: config.data_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut pools = HashMap::new();
        for &database in databases {
            if pools.contains_key(&database) {
                continue;
            }
            let pool = ConnectionPool::open(database, &config.path_for(database), config).await?;
            SchemaManager::ensure_schema(&pool).await?;
            pools.insert(database, pool);
        }

        info!(
            data_dir = %config.data_dir.display(),
            databases = pools.len(),
            "Storage ready"
        );

        Ok(Self {
            config: config.clone(),
            pools,
        })
    }

    /// Open every logical database
    pub async fn open_all(config: &PoolConfig) -> Result<Self> {
        Self::open(config, &LogicalDatabase::ALL).await
    }

    pub fn pool(&self, database: LogicalDatabase) -> Result<&ConnectionPool> {
        self.pools
            .get(&database)
            .ok_or_else(|| AppError::Config(format!("logical database '{}' is not open", database)))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Open databases in a stable order
    pub fn databases(&self) -> Vec<LogicalDatabase> {
        let mut databases: Vec<_> = self.pools.keys().copied().collect();
        databases.sort();
        databases
    }

    pub async fn close(&self) {
        for pool in self.pools.values() {
            pool.close().await;
        }
    }
}
