// Analytics Repository Port

use crate::domain::AnalyticsRecord;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Append a sample, returning its row id
    async fn record(&self, record: &AnalyticsRecord) -> Result<i64>;

    /// Samples at or after `since`, oldest first, optionally for one metric
    async fn list_since(
        &self,
        since: DateTime<Utc>,
        metric_type: Option<&str>,
    ) -> Result<Vec<AnalyticsRecord>>;
}
