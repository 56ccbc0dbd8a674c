// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid queue status transition for {id}: {from} -> {to}")]
    InvalidStateTransition { id: String, from: String, to: String },

    #[error("Retries exhausted for queue item {0}")]
    RetriesExhausted(String),

    #[error("Unknown queue status: {0}")]
    UnknownStatus(String),

    #[error("Unknown logical database: {0}")]
    UnknownDatabase(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(i32),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// True when the error means the item itself can never be advanced
    pub fn is_item_terminal(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidStateTransition { .. } | DomainError::RetriesExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
