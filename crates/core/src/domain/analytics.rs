// Analytics Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only metric sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// Assigned by storage on insert
    pub id: Option<i64>,
    pub metric_type: String,
    pub metric_value: Option<f64>,
    pub platform: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl AnalyticsRecord {
    pub fn new(metric_type: impl Into<String>, metric_value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            metric_type: metric_type.into(),
            metric_value: Some(metric_value),
            platform: None,
            timestamp,
            metadata: None,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }
}
