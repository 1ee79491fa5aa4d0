use thiserror::Error;

use crate::core_types::AccountId;
use crate::event_log::{FundingStatus, StoreError};
use crate::locks::LockTimeout;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FundingError {
    #[error("Invalid amount: must be positive")]
    InvalidAmount,

    #[error("Invalid provider name: {0}")]
    InvalidProvider(String),

    #[error("Invalid idempotency token: {0}")]
    InvalidToken(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Token already recorded for a different account or amount
    #[error("Idempotency token {0} already used for a different funding request")]
    TokenConflict(String),

    #[error("No funding event for token {0}")]
    UnknownFundingEvent(String),

    #[error("Outcome must be SETTLED or FAILED, got {0}")]
    InvalidOutcome(FundingStatus),

    #[error("Account is busy, retry later")]
    Busy,

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl FundingError {
    pub fn code(&self) -> &'static str {
        match self {
            FundingError::InvalidAmount => "INVALID_AMOUNT",
            FundingError::InvalidProvider(_) => "INVALID_PROVIDER",
            FundingError::InvalidToken(_) => "INVALID_TOKEN",
            FundingError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            FundingError::TokenConflict(_) => "TOKEN_CONFLICT",
            FundingError::UnknownFundingEvent(_) => "UNKNOWN_FUNDING_EVENT",
            FundingError::InvalidOutcome(_) => "INVALID_OUTCOME",
            FundingError::Busy => "BUSY",
            FundingError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            FundingError::InvalidAmount
            | FundingError::InvalidProvider(_)
            | FundingError::InvalidToken(_)
            | FundingError::InvalidOutcome(_) => 400,
            FundingError::AccountNotFound(_) | FundingError::UnknownFundingEvent(_) => 404,
            FundingError::TokenConflict(_) => 409,
            FundingError::Busy => 503,
            FundingError::Storage(_) => 500,
        }
    }
}

impl From<StoreError> for FundingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => FundingError::AccountNotFound(id),
            StoreError::Busy => FundingError::Busy,
            other => FundingError::Storage(other.to_string()),
        }
    }
}

impl From<LockTimeout> for FundingError {
    fn from(_: LockTimeout) -> Self {
        FundingError::Busy
    }
}
