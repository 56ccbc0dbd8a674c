// Pool configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use unistore_core::domain::LogicalDatabase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Directory holding one file per logical database
    pub data_dir: PathBuf,
    pub max_connections: u32,
    /// How long `acquire` waits for a free connection (ms)
    pub acquire_timeout_ms: u64,
    /// How long a statement waits on another writer's lock (ms)
    pub busy_timeout_ms: u64,
    /// Page cache size in pages
    pub cache_size: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_connections: 5,
            acquire_timeout_ms: 30_000,
            busy_timeout_ms: 30_000,
            cache_size: 10_000,
        }
    }
}

impl PoolConfig {
    pub fn path_for(&self, database: LogicalDatabase) -> PathBuf {
        self.data_dir.join(database.file_name())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
