// SQLite Connection Pool Setup

use crate::config::PoolConfig;
use crate::error::{map_open_error, map_sqlx_error};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Sqlite;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use unistore_core::application::ShutdownToken;
use unistore_core::domain::LogicalDatabase;
use unistore_core::error::{AppError, Result};

/// Leased connection; returned to its pool (or closed at capacity) on drop
pub type PooledConnection = PoolConnection<Sqlite>;

/// Bounded pool over one logical database file
#[derive(Clone)]
pub struct ConnectionPool {
    database: LogicalDatabase,
    path: PathBuf,
    pool: SqlitePool,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Open (creating if missing) the database file and its pool
    ///
    /// Every connection gets WAL journaling, `synchronous=NORMAL`, foreign keys,
    /// the configured page cache and busy timeout. One connection is opened
    /// eagerly so an unusable file fails here and is not retried.
    pub async fn open(database: LogicalDatabase, path: &Path, config: &PoolConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout())
            .pragma("cache_size", config.cache_size.to_string());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| map_open_error(e, path))?;

        info!(
            database = %database,
            path = %path.display(),
            max_connections = config.max_connections,
            "Connection pool opened"
        );

        Ok(Self {
            database,
            path: path.to_path_buf(),
            pool,
            acquire_timeout: config.acquire_timeout(),
        })
    }

    pub fn database(&self) -> LogicalDatabase {
        self.database
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying sqlx pool, for statements that manage their own scope
    pub fn sqlx_pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire with the configured timeout
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.acquire_timeout).await
    }

    /// Acquire, giving up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.pool.acquire()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => Err(self.timed_out(started)),
            Ok(Err(e)) => Err(map_sqlx_error(e)),
        }
    }

    /// Acquire before `deadline` unless `shutdown` fires first
    pub async fn acquire_until(
        &self,
        deadline: Instant,
        shutdown: &mut ShutdownToken,
    ) -> Result<PooledConnection> {
        if shutdown.is_shutdown() {
            return Err(AppError::Cancelled(self.database.to_string()));
        }
        let timeout = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            conn = self.acquire_timeout(timeout) => conn,
            _ = shutdown.wait() => {
                debug!(database = %self.database, "Connection acquire cancelled");
                Err(AppError::Cancelled(self.database.to_string()))
            }
        }
    }

    /// Connections currently open (idle + leased)
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Close all connections; waits for leased ones to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        info!(database = %self.database, "Connection pool closed");
    }

    fn timed_out(&self, started: Instant) -> AppError {
        AppError::PoolTimeout {
            database: self.database.to_string(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }
}
