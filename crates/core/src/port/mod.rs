// Port Layer - Interfaces for external dependencies

pub mod analytics_repository;
pub mod id_provider; // For deterministic testing
pub mod migrator;
pub mod publisher;
pub mod queue_repository;
pub mod retention;
pub mod time_provider;

// Re-exports
pub use analytics_repository::AnalyticsRepository;
pub use id_provider::{IdProvider, UuidProvider};
pub use migrator::Migrator;
pub use publisher::{PublishError, Publisher};
pub use queue_repository::{EnqueueOutcome, QueueRepository};
pub use retention::{Retention, RetentionConfig, RetentionRun, StorageStats, SweepReport};
pub use time_provider::{SystemTimeProvider, TimeProvider};
