//! Transfer Error Types

use thiserror::Error;

use crate::balance::ProjectionError;
use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::StoreError;
use crate::locks::LockTimeout;

/// Transfer error types
///
/// Every variant maps to exactly one [`super::TransferStatus`]; `code()` is
/// the stable string callers branch on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid recipient phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("No account registered for {0}")]
    RecipientNotFound(String),

    #[error("Sender account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Cannot transfer to your own account")]
    SelfTransfer,

    // === Balance Errors ===
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: MinorUnits,
        requested: MinorUnits,
    },

    // === System Errors ===
    #[error("Accounts are busy, retry later")]
    Busy,

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::InvalidPhoneNumber(_) => "INVALID_PHONE_NUMBER",
            TransferError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::Busy => "BUSY",
            TransferError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount
            | TransferError::InvalidPhoneNumber(_)
            | TransferError::SelfTransfer => 400,
            TransferError::RecipientNotFound(_) | TransferError::AccountNotFound(_) => 404,
            TransferError::InsufficientFunds { .. } => 422,
            TransferError::Busy => 503,
            TransferError::Storage(_) => 500,
        }
    }

    /// Resubmitting the same transfer may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Busy)
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            StoreError::Overdraft {
                available,
                requested,
            } => TransferError::InsufficientFunds {
                available,
                requested,
            },
            StoreError::Busy => TransferError::Busy,
            other => TransferError::Storage(other.to_string()),
        }
    }
}

impl From<ProjectionError> for TransferError {
    fn from(e: ProjectionError) -> Self {
        match e {
            ProjectionError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            ProjectionError::Store(inner) => inner.into(),
            overflow @ ProjectionError::Overflow(_) => TransferError::Storage(overflow.to_string()),
        }
    }
}

impl From<LockTimeout> for TransferError {
    fn from(_: LockTimeout) -> Self {
        TransferError::Busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SelfTransfer.code(), "SELF_TRANSFER");
        assert_eq!(
            TransferError::RecipientNotFound("***0000".into()).code(),
            "RECIPIENT_NOT_FOUND"
        );
        assert_eq!(TransferError::Busy.code(), "BUSY");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidAmount.http_status(), 400);
        assert_eq!(TransferError::AccountNotFound(1).http_status(), 404);
        assert_eq!(
            TransferError::InsufficientFunds {
                available: 0,
                requested: 1
            }
            .http_status(),
            422
        );
        assert_eq!(TransferError::Busy.http_status(), 503);
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            TransferError::from(StoreError::Overdraft {
                available: 5,
                requested: 9
            }),
            TransferError::InsufficientFunds {
                available: 5,
                requested: 9
            }
        );
        assert_eq!(TransferError::from(StoreError::Busy), TransferError::Busy);
        assert!(matches!(
            TransferError::from(StoreError::Database("boom".into())),
            TransferError::Storage(_)
        ));
        assert!(TransferError::from(LockTimeout { account_id: 3 }).is_retryable());
    }
}
