// Central Error Type for the Application

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection pool for '{database}' timed out after {waited_ms}ms")]
    PoolTimeout { database: String, waited_ms: u64 },

    #[error("Connection acquire cancelled for '{0}'")]
    Cancelled(String),

    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a caller should react to an error.
///
/// Producers and workers branch on this instead of matching error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry-safe: no connection, busy database, concurrent modification
    Transient,
    /// The item can never make progress (exhausted retries, illegal transition, unknown id)
    PermanentForItem,
    /// The process cannot use its storage (file cannot be opened, bad configuration)
    PermanentForProcess,
    /// The request itself is malformed
    InvalidInput,
    /// Unclassified database or internal failure
    Unexpected,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Busy(_)
            | AppError::PoolTimeout { .. }
            | AppError::Cancelled(_)
            | AppError::Conflict(_) => ErrorClass::Transient,
            AppError::NotFound(_) => ErrorClass::PermanentForItem,
            AppError::Domain(e) => {
                if e.is_item_terminal() {
                    ErrorClass::PermanentForItem
                } else {
                    ErrorClass::InvalidInput
                }
            }
            AppError::StorageUnavailable { .. } | AppError::Config(_) | AppError::Io(_) => {
                ErrorClass::PermanentForProcess
            }
            AppError::Validation(_) | AppError::Serialization(_) => ErrorClass::InvalidInput,
            AppError::Database(_) | AppError::Internal(_) => ErrorClass::Unexpected,
        }
    }

    /// Shorthand for `class() == ErrorClass::Transient`
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
