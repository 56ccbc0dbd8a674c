// Queue Status Report

use crate::domain::queue::QueueStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of recent failures carried in a status report
pub const RECENT_FAILURE_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub id: String,
    pub platform: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatusReport {
    /// Row count per status
    pub status_counts: BTreeMap<String, u64>,
    /// Pending rows per platform
    pub platform_distribution: BTreeMap<String, u64>,
    pub recent_failures: Vec<FailureSummary>,
}

impl QueueStatusReport {
    pub fn count(&self, status: QueueStatus) -> u64 {
        self.status_counts.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn total_pending(&self) -> u64 {
        self.count(QueueStatus::Pending)
    }

    pub fn total_posted(&self) -> u64 {
        self.count(QueueStatus::Posted)
    }

    pub fn total_failed(&self) -> u64 {
        self.count(QueueStatus::Failed)
    }
}
