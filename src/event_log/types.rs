//! Event Log Row Types
//!
//! Status ids match the `SMALLINT` columns of the PostgreSQL schema.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::StoreError;
use crate::account::ValidationError;
use crate::balance::Balance;
use crate::core_types::{AccountId, FundingEventId, MinorUnits, TransferEventId};

// ============================================================================
// Status enums
// ============================================================================

/// Funding event status
///
/// Transitions at most once: PENDING → SETTLED | FAILED. Never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum FundingStatus {
    Pending = 0,
    Settled = 1,
    Failed = -1,
}

impl FundingStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, FundingStatus::Settled | FundingStatus::Failed)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(FundingStatus::Pending),
            1 => Some(FundingStatus::Settled),
            -1 => Some(FundingStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FundingStatus::Pending => "PENDING",
            FundingStatus::Settled => "SETTLED",
            FundingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FundingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FundingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(FundingStatus::Pending),
            "settled" | "success" => Ok(FundingStatus::Settled),
            "failed" | "failure" => Ok(FundingStatus::Failed),
            _ => Err(format!("Invalid funding status: {}", s)),
        }
    }
}

/// Transfer event status
///
/// Only COMPLETED rows are ever written by the coordinator (rejections append
/// nothing); REJECTED exists for rows imported from elsewhere and is ignored
/// by the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferEventStatus {
    Completed = 1,
    Rejected = -1,
}

impl TransferEventStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransferEventStatus::Completed),
            -1 => Some(TransferEventStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferEventStatus::Completed => "COMPLETED",
            TransferEventStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TransferEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Caller-visible transfer id: `p2p_<ULID>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub const PREFIX: &'static str = "p2p_";

    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        Ok(Self(ulid::Ulid::from_string(raw)?))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Funding idempotency token: provider-supplied or generated (UUIDv4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    pub const MAX_LEN: usize = 128;

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let token = raw.trim();
        if token.is_empty() || token.len() > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "idempotency_token",
                min: 1,
                max: Self::MAX_LEN,
                actual: token.len(),
            });
        }
        if !token.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidFormat {
                field: "idempotency_token",
                value: token.to_string(),
                expected: "visible ASCII characters",
            });
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Money entering the system from an external provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingEvent {
    pub id: FundingEventId,
    pub account_id: AccountId,
    pub provider: String,
    pub amount: MinorUnits,
    pub status: FundingStatus,
    pub idempotency_token: IdempotencyToken,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Funding row to append (always PENDING)
#[derive(Debug, Clone)]
pub struct NewFundingEvent {
    pub account_id: AccountId,
    pub provider: String,
    pub amount: MinorUnits,
    pub idempotency_token: IdempotencyToken,
    pub created_at: DateTime<Utc>,
}

impl NewFundingEvent {
    /// Row constraints every backend enforces before writing
    pub fn check(&self) -> Result<(), StoreError> {
        if self.amount <= 0 {
            return Err(StoreError::InvalidRow(format!(
                "funding amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Value moving between two accounts. Immutable once COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    pub id: TransferEventId,
    pub transaction_id: TransactionId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: MinorUnits,
    pub status: TransferEventStatus,
    pub description: String,
    pub processed_at: DateTime<Utc>,
}

/// Transfer row to append (always COMPLETED)
#[derive(Debug, Clone)]
pub struct NewTransferEvent {
    pub transaction_id: TransactionId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: MinorUnits,
    pub description: String,
    pub processed_at: DateTime<Utc>,
}

impl NewTransferEvent {
    /// Row constraints every backend enforces before writing
    pub fn check(&self) -> Result<(), StoreError> {
        if self.amount <= 0 {
            return Err(StoreError::InvalidRow(format!(
                "transfer amount must be positive, got {}",
                self.amount
            )));
        }
        if self.sender_id == self.receiver_id {
            return Err(StoreError::InvalidRow(format!(
                "sender and receiver are both account {}",
                self.sender_id
            )));
        }
        Ok(())
    }
}

/// Every log row that touches one account
#[derive(Debug, Clone, Default)]
pub struct AccountEvents {
    pub funding: Vec<FundingEvent>,
    /// Transfers where the account is sender or receiver
    pub transfers: Vec<TransferEvent>,
}

/// Cached projection for one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub balance: Balance,
    /// Bumped on every rewrite
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Result of appending a funding event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingAppend {
    Created(FundingEvent),
    /// Token already present; the stored row is returned untouched
    Existing(FundingEvent),
}

/// Result of a PENDING → terminal compare-and-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingTransition {
    Applied(FundingEvent),
    AlreadyTerminal(FundingEvent),
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funding_terminal_states() {
        assert!(!FundingStatus::Pending.is_terminal());
        assert!(FundingStatus::Settled.is_terminal());
        assert!(FundingStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_ids() {
        assert_eq!(FundingStatus::from_id(FundingStatus::Failed.id()), Some(FundingStatus::Failed));
        assert_eq!(FundingStatus::from_id(7), None);
        assert_eq!(
            TransferEventStatus::from_id(1),
            Some(TransferEventStatus::Completed)
        );
        assert_eq!(TransferEventStatus::from_id(0), None);
    }

    #[test]
    fn test_funding_status_from_provider_words() {
        assert_eq!("Success".parse::<FundingStatus>(), Ok(FundingStatus::Settled));
        assert_eq!("FAILED".parse::<FundingStatus>(), Ok(FundingStatus::Failed));
        assert!("refunded".parse::<FundingStatus>().is_err());
    }

    #[test]
    fn test_transaction_id_format() {
        let id = TransactionId::new();
        let text = id.to_string();
        assert!(text.starts_with("p2p_"));
        assert_eq!(text.parse::<TransactionId>().unwrap(), id);
        assert_eq!(
            serde_json::to_value(id).unwrap(),
            serde_json::Value::String(text)
        );
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = IdempotencyToken::generate();
        let b = IdempotencyToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_token_validation() {
        assert_eq!(
            IdempotencyToken::parse("  pi_3Nx  ").unwrap().as_str(),
            "pi_3Nx"
        );
        assert!(IdempotencyToken::parse("").is_err());
        assert!(IdempotencyToken::parse("has space").is_err());
        assert!(IdempotencyToken::parse(&"x".repeat(129)).is_err());
    }
}
