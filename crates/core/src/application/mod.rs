// Application Layer - Use Cases and Business Logic

pub mod backoff;
pub mod consolidation;
pub mod lease_monitor;
pub mod queue;
pub mod retention;
pub mod worker;

// Re-exports
pub use backoff::BackoffPolicy;
pub use consolidation::{ConsolidationReport, ConsolidationService};
pub use lease_monitor::{LeaseMonitorConfig, StuckLeaseMonitor};
pub use queue::{EnqueueRequest, QueueService};
pub use retention::RetentionScheduler;
pub use worker::{shutdown_channel, DeliveryWorker, ShutdownSender, ShutdownToken};
