// Schema Manager

use crate::error::map_sqlx_error;
use crate::pool::ConnectionPool;
use tracing::{debug, info};
use unistore_core::domain::LogicalDatabase;
use unistore_core::error::Result;

const CORE_SCHEMA: &str = include_str!("../schema/core.sql");
const SOCIAL_SCHEMA: &str = include_str!("../schema/social.sql");
const MARKET_SCHEMA: &str = include_str!("../schema/market.sql");

/// Creates the unified tables and indexes of each logical database
pub struct SchemaManager;

impl SchemaManager {
    pub const VERSION: i64 = 1;

    pub fn ddl(database: LogicalDatabase) -> &'static str {
        match database {
            LogicalDatabase::Core => CORE_SCHEMA,
            LogicalDatabase::Social => SOCIAL_SCHEMA,
            LogicalDatabase::Market => MARKET_SCHEMA,
        }
    }

    /// Data tables in dependency order (referenced tables first)
    pub fn unified_tables(database: LogicalDatabase) -> &'static [&'static str] {
        match database {
            LogicalDatabase::Core => &["content", "queue", "analytics"],
            LogicalDatabase::Social => &["posts", "engagement", "followers"],
            LogicalDatabase::Market => &["financial_news", "market_data", "signals"],
        }
    }

    /// Idempotent; runs the whole DDL in one transaction
    pub async fn ensure_schema(pool: &ConnectionPool) -> Result<()> {
        let database = pool.database();
        let mut tx = pool.sqlx_pool().begin().await.map_err(map_sqlx_error)?;

        for statement in Self::ddl(database).split(';') {
            // Remove comments and trim
            let clean_statement: String = statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();

            if !clean_statement.is_empty() {
                sqlx::query(&clean_statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
            }
        }

        let applied = sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
            .bind(Self::VERSION)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        if applied.rows_affected() > 0 {
            info!(database = %database, version = Self::VERSION, "Schema created");
        } else {
            debug!(database = %database, version = Self::VERSION, "Schema already present");
        }
        Ok(())
    }
}
