//! Transfer outcome types

use serde::Serialize;
use std::fmt;

use super::error::TransferError;
use crate::event_log::{TransactionId, TransferEvent};

/// Stable outcome of a transfer request; one value per rejection cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Completed,
    InvalidAmount,
    InvalidPhoneNumber,
    RecipientNotFound,
    AccountNotFound,
    SelfTransfer,
    InsufficientFunds,
    Busy,
    StorageFailure,
}

impl TransferStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::InvalidAmount => "INVALID_AMOUNT",
            TransferStatus::InvalidPhoneNumber => "INVALID_PHONE_NUMBER",
            TransferStatus::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            TransferStatus::AccountNotFound => "ACCOUNT_NOT_FOUND",
            TransferStatus::SelfTransfer => "SELF_TRANSFER",
            TransferStatus::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransferStatus::Busy => "BUSY",
            TransferStatus::StorageFailure => "STORAGE_FAILURE",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransferError> for TransferStatus {
    fn from(e: &TransferError) -> Self {
        match e {
            TransferError::InvalidAmount => TransferStatus::InvalidAmount,
            TransferError::InvalidPhoneNumber(_) => TransferStatus::InvalidPhoneNumber,
            TransferError::RecipientNotFound(_) => TransferStatus::RecipientNotFound,
            TransferError::AccountNotFound(_) => TransferStatus::AccountNotFound,
            TransferError::SelfTransfer => TransferStatus::SelfTransfer,
            TransferError::InsufficientFunds { .. } => TransferStatus::InsufficientFunds,
            TransferError::Busy => TransferStatus::Busy,
            TransferError::Storage(_) => TransferStatus::StorageFailure,
        }
    }
}

/// Caller-facing result of `transfer`
///
/// `message` is for display only; branch on `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub message: String,
}

impl TransferResult {
    pub fn completed(event: &TransferEvent) -> Self {
        Self {
            status: TransferStatus::Completed,
            transaction_id: Some(event.transaction_id),
            message: "Transfer completed successfully".to_string(),
        }
    }

    pub fn rejected(error: &TransferError) -> Self {
        Self {
            status: TransferStatus::from(error),
            transaction_id: None,
            message: error.to_string(),
        }
    }
}

impl From<Result<TransferEvent, TransferError>> for TransferResult {
    fn from(result: Result<TransferEvent, TransferError>) -> Self {
        match result {
            Ok(event) => TransferResult::completed(&event),
            Err(e) => TransferResult::rejected(&e),
        }
    }
}
