// sqlx::Error -> AppError mapping
//
// SQLite result codes: https://www.sqlite.org/rescode.html
// sqlx reports the extended code; the primary code is its low byte.

use std::path::Path;
use unistore_core::domain::RowSkipReason;
use unistore_core::error::AppError;

const SQLITE_PERM: i32 = 3;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_READONLY: i32 = 8;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_TOOBIG: i32 = 18;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_MISMATCH: i32 = 20;
const SQLITE_NOTADB: i32 = 26;

const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Extended result code of a database error, if any
pub(crate) fn sqlite_code(err: &sqlx::Error) -> Option<i32> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().and_then(|c| c.parse().ok()),
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        sqlite_code(err),
        Some(SQLITE_CONSTRAINT_UNIQUE) | Some(SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Convert sqlx::Error to AppError with structured information
pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match sqlite_code(&err) {
                Some(code) => match code & 0xff {
                    SQLITE_BUSY | SQLITE_LOCKED => {
                        AppError::Busy(format!("{} ({})", message, code))
                    }
                    SQLITE_CONSTRAINT => AppError::Conflict(format!(
                        "Constraint violation: {} ({})",
                        message, code
                    )),
                    SQLITE_PERM | SQLITE_READONLY | SQLITE_CORRUPT | SQLITE_FULL
                    | SQLITE_CANTOPEN | SQLITE_NOTADB => AppError::StorageUnavailable {
                        path: String::new(),
                        reason: format!("{} ({})", message, code),
                    },
                    _ => AppError::Database(format!("Database error [{}]: {}", code, message)),
                },
                None => AppError::Database(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::PoolTimedOut => AppError::Busy("connection pool timed out".to_string()),
        sqlx::Error::PoolClosed => AppError::Cancelled("connection pool closed".to_string()),
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        sqlx::Error::Io(io) => AppError::Database(format!("I/O error: {}", io)),
        _ => AppError::Database(err.to_string()),
    }
}

/// Errors while opening a database file are fatal for the process
pub(crate) fn map_open_error(err: sqlx::Error, path: &Path) -> AppError {
    match map_sqlx_error(err) {
        AppError::StorageUnavailable { reason, .. } => AppError::StorageUnavailable {
            path: path.display().to_string(),
            reason,
        },
        AppError::Database(reason) => AppError::StorageUnavailable {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    }
}

/// Outcome of a failed row insert during migration
#[derive(Debug)]
pub(crate) enum RowError {
    /// The row is skipped; its table continues
    Skip(RowSkipReason),
    /// Storage-level failure; the table is aborted
    Fatal(AppError),
}

pub(crate) fn classify_row_error(err: sqlx::Error) -> RowError {
    let Some(code) = sqlite_code(&err) else {
        return RowError::Fatal(map_sqlx_error(err));
    };

    match code {
        SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
            RowError::Skip(RowSkipReason::Duplicate)
        }
        _ => match code & 0xff {
            SQLITE_CONSTRAINT => RowError::Skip(RowSkipReason::ConstraintViolation),
            SQLITE_MISMATCH | SQLITE_TOOBIG => RowError::Skip(RowSkipReason::SchemaMismatch),
            _ => RowError::Fatal(map_sqlx_error(err)),
        },
    }
}
