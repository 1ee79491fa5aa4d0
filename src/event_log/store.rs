//! Ledger Store Trait
//!
//! The only persistence seam of the engine. Backends own the two append-only
//! event tables and the derived snapshot table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::types::{
    AccountEvents, BalanceSnapshot, FundingAppend, FundingEvent, FundingStatus, FundingTransition,
    IdempotencyToken, NewFundingEvent, NewTransferEvent, TransferEvent,
};
use crate::account::{Account, PhoneNumber};
use crate::core_types::AccountId;

/// Durable event log plus snapshot cache
///
/// # Atomicity
/// Every mutating method is a single all-or-nothing unit: the event row and
/// the snapshot rows of every affected account are written together, and
/// snapshots are re-projected from log rows read inside that same unit.
/// On error nothing is visible.
///
/// # Retries
/// Implementations never retry a mutation internally.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Create an account with a zero snapshot. Duplicate phone → `Conflict`.
    async fn create_account(&self, phone: &PhoneNumber) -> Result<Account, StoreError>;

    async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<Account>, StoreError>;

    /// All account ids, ascending
    async fn list_account_ids(&self) -> Result<Vec<AccountId>, StoreError>;

    /// Funding rows of the account plus every transfer it sent or received
    async fn account_events(&self, account_id: AccountId) -> Result<AccountEvents, StoreError>;

    async fn funding_by_token(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<FundingEvent>, StoreError>;

    /// Append a PENDING funding row and refresh the account snapshot.
    ///
    /// # Idempotency
    /// If the token already exists, returns `Existing` with the stored row.
    async fn append_funding(&self, event: &NewFundingEvent) -> Result<FundingAppend, StoreError>;

    /// Compare-and-set PENDING → `outcome`, refreshing the account snapshot.
    ///
    /// A row that is already terminal is returned as `AlreadyTerminal`
    /// without modification.
    async fn resolve_funding(
        &self,
        token: &IdempotencyToken,
        outcome: FundingStatus,
        at: DateTime<Utc>,
    ) -> Result<FundingTransition, StoreError>;

    /// Append a COMPLETED transfer and refresh both snapshots.
    ///
    /// Re-checks the sender's projected available balance inside the unit and
    /// fails with `Overdraft` (writing nothing) if it is short.
    async fn append_transfer(&self, event: &NewTransferEvent)
    -> Result<TransferEvent, StoreError>;

    /// Cached snapshot, if one has been written
    async fn snapshot(&self, account_id: AccountId) -> Result<Option<BalanceSnapshot>, StoreError>;

    /// Re-project the account from the log and overwrite its snapshot
    async fn refresh_snapshot(&self, account_id: AccountId) -> Result<BalanceSnapshot, StoreError>;
}
