// Consolidation - fold every known legacy store into the unified databases

use crate::domain::{LogicalDatabase, MigrationReport};
use crate::error::Result;
use crate::port::Migrator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSource {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConsolidation {
    pub database: LogicalDatabase,
    pub migrated: Vec<MigrationReport>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<FailedSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub databases: Vec<DatabaseConsolidation>,
}

impl ConsolidationReport {
    pub fn rows_migrated(&self) -> u64 {
        self.databases
            .iter()
            .flat_map(|d| d.migrated.iter())
            .map(|r| r.total_migrated())
            .sum()
    }
}

/// One-time (re-runnable) consolidation pass
///
/// Schemas must already exist; opening `Storage` ensures them.
pub struct ConsolidationService {
    migrator: Arc<dyn Migrator>,
    legacy_root: PathBuf,
}

impl ConsolidationService {
    pub fn new(migrator: Arc<dyn Migrator>, legacy_root: impl Into<PathBuf>) -> Self {
        Self {
            migrator,
            legacy_root: legacy_root.into(),
        }
    }

    pub fn legacy_root(&self) -> &Path {
        &self.legacy_root
    }

    /// Migrate the default legacy sources of each database
    ///
    /// Missing sources are recorded. A source that cannot be opened is recorded
    /// and the pass moves on.
    pub async fn consolidate(&self, databases: &[LogicalDatabase]) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();

        for &database in databases {
            let mut entry = DatabaseConsolidation {
                database,
                migrated: Vec::new(),
                missing: Vec::new(),
                failed: Vec::new(),
            };

            for source in database.legacy_sources() {
                let path = self.legacy_root.join(source);
                if !path.exists() {
                    info!(database = %database, source = %path.display(), "Legacy source not present");
                    entry.missing.push(path);
                    continue;
                }

                match self.migrator.migrate_from(&path, database).await {
                    Ok(migration) => entry.migrated.push(migration),
                    Err(e) => {
                        error!(
                            database = %database,
                            source = %path.display(),
                            error = %e,
                            "Legacy source could not be migrated"
                        );
                        entry.failed.push(FailedSource {
                            path,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if !entry.failed.is_empty() {
                warn!(database = %database, failed = entry.failed.len(), "Consolidation incomplete");
            }
            report.databases.push(entry);
        }

        info!(rows_migrated = report.rows_migrated(), "Consolidation complete");
        Ok(report)
    }
}
