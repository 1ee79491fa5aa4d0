//! Data models for ledger accounts

use chrono::{DateTime, Utc};

use super::validation::PhoneNumber;
use crate::core_types::AccountId;

/// Ledger account
///
/// Created at signup, never deleted. Identity fields are immutable: the
/// phone number is the P2P transfer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: AccountId,
    pub phone: PhoneNumber,
    pub created_at: DateTime<Utc>,
}
