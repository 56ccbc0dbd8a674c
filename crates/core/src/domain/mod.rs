// Domain Layer - Pure business logic and entities

pub mod analytics;
pub mod content;
pub mod database;
pub mod error;
pub mod migration;
pub mod queue;
pub mod status;

// Re-exports
pub use analytics::AnalyticsRecord;
pub use content::{content_hash, normalize_content, ContentRecord};
pub use database::LogicalDatabase;
pub use error::DomainError;
pub use migration::{
    LegacyQueueFixup, MigrationReport, RowSkipReason, SkipCounts, SkippedTable, TableReport,
    TableSkipReason,
};
pub use queue::{FailureOutcome, ItemId, PostOutcome, Priority, QueueItem, QueueStatus};
pub use status::{FailureSummary, QueueStatusReport};
