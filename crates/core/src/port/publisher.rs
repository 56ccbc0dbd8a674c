// Publisher Port
// Outbound delivery of one queue item to its platform. Implementations live
// outside this workspace (Telegram, Discord, Twitter clients, ...).

use crate::domain::QueueItem;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Failed(String),

    /// Platform asked us to back off; the item is retried no earlier than this
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver one item. Must not touch storage.
    async fn publish(&self, item: &QueueItem) -> Result<(), PublishError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock publisher behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Always rate limited
        RateLimited(Duration),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Publisher recording every item it was handed
    pub struct MockPublisher {
        behavior: Arc<Mutex<MockBehavior>>,
        published: Arc<Mutex<Vec<String>>>,
    }

    impl MockPublisher {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                published: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        /// IDs of every item passed to `publish`, in call order
        pub fn calls(&self) -> Vec<String> {
            self.published.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for MockPublisher {
        async fn publish(&self, item: &QueueItem) -> Result<(), PublishError> {
            self.published.lock().unwrap().push(item.id.clone());

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(PublishError::Failed(msg)),
                MockBehavior::RateLimited(retry_after) => {
                    Err(PublishError::RateLimited { retry_after })
                }
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
            }
        }
    }
}
