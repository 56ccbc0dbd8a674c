// Unistore Infrastructure - SQLite Adapter
// Implements: QueueRepository, AnalyticsRepository, Retention, Migrator

mod analytics_repository;
mod config;
mod error;
mod migrator;
mod pool;
mod queue_repository;
mod retention;
mod schema;
mod storage;
mod timestamp;

pub use analytics_repository::SqliteAnalyticsRepository;
pub use config::PoolConfig;
pub use error::map_sqlx_error;
pub use migrator::SqliteMigrator;
pub use pool::{ConnectionPool, PooledConnection};
pub use queue_repository::SqliteQueueRepository;
pub use retention::SqliteRetention;
pub use schema::SchemaManager;
pub use storage::Storage;

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
