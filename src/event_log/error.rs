//! Store Error Types

use thiserror::Error;

use crate::core_types::{AccountId, MinorUnits};

/// Errors raised by a `LedgerStore` backend.
///
/// Any error returned from a mutating store method guarantees that nothing
/// was written: the log append and the snapshot rewrite commit together or
/// not at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Guard inside the atomic unit: the sender's projected balance is short
    #[error("Overdraft rejected: available {available}, requested {requested}")]
    Overdraft {
        available: MinorUnits,
        requested: MinorUnits,
    },

    /// Amount not positive, or a transfer from an account to itself
    #[error("Row rejected: {0}")]
    InvalidRow(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Balance arithmetic overflow for account {0}")]
    Overflow(AccountId),

    /// Lock wait or pool acquisition timed out; safe for the caller to resubmit
    #[error("Store busy (lock timeout)")]
    Busy,

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            StoreError::Overdraft { .. } => "INSUFFICIENT_FUNDS",
            StoreError::InvalidRow(_) => "INVALID_ROW",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Overflow(_) => "OVERFLOW",
            StoreError::Busy => "BUSY",
            StoreError::Corrupt(_) => "CORRUPT_ROW",
            StoreError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                // lock_not_available, deadlock_detected, serialization_failure
                Some("55P03") | Some("40P01") | Some("40001") => return StoreError::Busy,
                Some("23505") => return StoreError::Conflict(db.message().to_string()),
                // check_violation
                Some("23514") => return StoreError::InvalidRow(db.message().to_string()),
                _ => {}
            }
        }
        if matches!(e, sqlx::Error::PoolTimedOut) {
            return StoreError::Busy;
        }
        StoreError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::Busy.code(), "BUSY");
        assert_eq!(
            StoreError::Overdraft {
                available: 1,
                requested: 2
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
    }

    #[test]
    fn test_invalid_row_is_not_retryable() {
        let err = StoreError::InvalidRow("amount".into());
        assert_eq!(err.code(), "INVALID_ROW");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_busy() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err, StoreError::Busy);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_sqlx_errors_are_database() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_retryable());
    }
}
