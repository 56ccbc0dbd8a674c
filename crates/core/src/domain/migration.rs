// Migration Report Model

use crate::domain::database::LogicalDatabase;
use serde::{Deserialize, Serialize};

/// Why a single source row was not copied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSkipReason {
    /// Collides with a row already present under a unique key
    Duplicate,
    /// Row shape does not fit the unified table (no shared columns, type mismatch)
    SchemaMismatch,
    /// NOT NULL, CHECK or foreign key rejected the row
    ConstraintViolation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub duplicate: u64,
    pub schema_mismatch: u64,
    pub constraint_violation: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: RowSkipReason) {
        match reason {
            RowSkipReason::Duplicate => self.duplicate += 1,
            RowSkipReason::SchemaMismatch => self.schema_mismatch += 1,
            RowSkipReason::ConstraintViolation => self.constraint_violation += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.duplicate + self.schema_mismatch + self.constraint_violation
    }
}

/// Outcome for one source table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub attempted: u64,
    pub migrated: u64,
    pub skipped: SkipCounts,
    /// Source columns with no counterpart in the unified table
    pub dropped_columns: Vec<String>,
    /// Unified columns absent from the source; filled by schema defaults
    pub defaulted_columns: Vec<String>,
    /// Set when a storage error stopped the table; its rows were rolled back
    pub aborted: Option<String>,
}

impl TableReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum TableSkipReason {
    /// No same-named table in the unified schema
    NotInSchema,
    /// The source table could not be read
    ReadFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: TableSkipReason,
}

/// Post-copy normalization of legacy queue rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyQueueFixup {
    /// Missing or legacy-format hashes replaced by the unified hash
    pub hashes_backfilled: u64,
    pub statuses_mapped: u64,
    /// Rows whose fix would break the active-duplicate rule; active ones are failed,
    /// approved ones stay approved
    pub conflicts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub source: String,
    pub target: LogicalDatabase,
    pub tables: Vec<TableReport>,
    pub skipped_tables: Vec<SkippedTable>,
    pub legacy_fixup: Option<LegacyQueueFixup>,
    /// Set when the fix-up failed; the copied rows are kept
    pub legacy_fixup_error: Option<String>,
}

impl MigrationReport {
    pub fn new(source: impl Into<String>, target: LogicalDatabase) -> Self {
        Self {
            source: source.into(),
            target,
            tables: Vec::new(),
            skipped_tables: Vec::new(),
            legacy_fixup: None,
            legacy_fixup_error: None,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn total_attempted(&self) -> u64 {
        self.tables.iter().map(|t| t.attempted).sum()
    }

    pub fn total_migrated(&self) -> u64 {
        self.tables.iter().map(|t| t.migrated).sum()
    }

    pub fn total_skipped(&self) -> SkipCounts {
        self.tables.iter().fold(SkipCounts::default(), |mut acc, t| {
            acc.duplicate += t.skipped.duplicate;
            acc.schema_mismatch += t.skipped.schema_mismatch;
            acc.constraint_violation += t.skipped.constraint_violation;
            acc
        })
    }
}
