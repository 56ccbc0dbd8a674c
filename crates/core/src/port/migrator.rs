// Legacy Store Migration Port

use crate::domain::{LogicalDatabase, MigrationReport};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Migrator: Send + Sync {
    /// Copy every same-named table of `source` into `target`
    ///
    /// Safe to re-run: rows already present are counted as duplicates.
    /// Row and table failures are reported, not returned.
    ///
    /// # Errors
    /// - `AppError::StorageUnavailable` if the source file cannot be opened
    async fn migrate_from(&self, source: &Path, target: LogicalDatabase)
        -> Result<MigrationReport>;
}
