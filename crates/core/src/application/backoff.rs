// Retry backoff for delivery workers
use crate::domain::QueueItem;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Exponential backoff with deterministic jitter
///
/// delay = base * factor^retry_count * (1.0 ± 0.1), capped at `max_delay`.
/// The jitter is seeded by the item id so one item always gets the same delay
/// for a given retry, while different items spread out.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay_ms: i64,
    factor: f64,
    max_delay_ms: i64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        // Legacy scripts waited 10 minutes before retrying a failed post
        Self::new(60_000, 2.0, 10 * 60_000)
    }
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: i64, factor: f64, max_delay_ms: i64) -> Self {
        Self {
            base_delay_ms,
            factor,
            max_delay_ms,
        }
    }

    /// Delay before the next attempt of `item`
    pub fn delay_ms(&self, item: &QueueItem) -> i64 {
        let raw = self.base_delay_ms as f64 * self.factor.powi(item.retry_count.max(0));

        let jitter_seed = item.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        ((raw * jitter_factor) as i64).min(self.max_delay_ms)
    }

    /// `scheduled_for` to pass to `mark_failed`
    pub fn next_attempt(&self, item: &QueueItem, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay_ms = self.delay_ms(item);
        debug!(
            item_id = %item.id,
            retry_count = item.retry_count,
            delay_ms,
            "Scheduling retry"
        );
        now + Duration::milliseconds(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, retry_count: i32) -> QueueItem {
        let mut item = QueueItem::new(id, Utc::now(), "x", "h", "telegram");
        item.retry_count = retry_count;
        item
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = BackoffPolicy::new(1000, 2.0, 5000);

        let first = policy.delay_ms(&item("a", 0));
        let second = policy.delay_ms(&item("a", 1));
        assert!((900..=1100).contains(&first));
        assert!((1800..=2200).contains(&second));
        assert_eq!(policy.delay_ms(&item("a", 10)), 5000);
    }

    #[test]
    fn test_jitter_is_deterministic_per_item() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay_ms(&item("item-42", 1)),
            policy.delay_ms(&item("item-42", 1))
        );
    }

    #[test]
    fn test_next_attempt_is_in_the_future() {
        let policy = BackoffPolicy::default();
        let now = Utc::now();
        assert!(policy.next_attempt(&item("b", 0), now) > now);
    }
}
