//! Balance projection - the single formula for available / pending
//!
//! ```text
//! available = Σ funding(SETTLED) − Σ transfers out(COMPLETED) + Σ transfers in(COMPLETED)
//! pending   = Σ funding(PENDING)
//! ```
//!
//! Every reader (UI glue, transfer validation, snapshot refresh, audit) goes
//! through [`project_events`]. Nothing here holds state: the same rows always
//! produce the same `Balance`, whether folded as a full log scan or replayed
//! change by change with [`replay_events`]. The audit runs both and reports
//! any account where they disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::{AccountEvents, FundingStatus, LedgerStore, StoreError, TransferEventStatus};

/// Projected balance of one account, in minor units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: MinorUnits,
    pub pending: MinorUnits,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Balance arithmetic overflow")]
pub struct BalanceOverflow;

impl Balance {
    pub const ZERO: Balance = Balance {
        available: 0,
        pending: 0,
    };

    pub fn new(available: MinorUnits, pending: MinorUnits) -> Self {
        Self { available, pending }
    }

    #[inline]
    fn add_available(&mut self, amount: MinorUnits) -> Result<(), BalanceOverflow> {
        self.available = self.available.checked_add(amount).ok_or(BalanceOverflow)?;
        Ok(())
    }

    #[inline]
    fn sub_available(&mut self, amount: MinorUnits) -> Result<(), BalanceOverflow> {
        self.available = self.available.checked_sub(amount).ok_or(BalanceOverflow)?;
        Ok(())
    }

    #[inline]
    fn add_pending(&mut self, amount: MinorUnits) -> Result<(), BalanceOverflow> {
        self.pending = self.pending.checked_add(amount).ok_or(BalanceOverflow)?;
        Ok(())
    }

    #[inline]
    fn sub_pending(&mut self, amount: MinorUnits) -> Result<(), BalanceOverflow> {
        self.pending = self.pending.checked_sub(amount).ok_or(BalanceOverflow)?;
        Ok(())
    }

    /// Apply one change from the append-only change stream.
    ///
    /// Changes that do not involve `account_id` leave the balance untouched.
    pub fn apply(
        &mut self,
        account_id: AccountId,
        change: &LedgerChange,
    ) -> Result<(), BalanceOverflow> {
        match *change {
            LedgerChange::FundingRecorded {
                account_id: owner,
                amount,
            } if owner == account_id => self.add_pending(amount),
            LedgerChange::FundingResolved {
                account_id: owner,
                amount,
                outcome,
            } if owner == account_id => {
                self.sub_pending(amount)?;
                if outcome == FundingStatus::Settled {
                    self.add_available(amount)?;
                }
                Ok(())
            }
            LedgerChange::TransferCompleted {
                sender_id,
                receiver_id,
                amount,
            } => {
                if sender_id == account_id {
                    self.sub_available(amount)?;
                }
                if receiver_id == account_id {
                    self.add_available(amount)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// One entry of the change stream: what the event log emits, in order, as
/// rows are appended or transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    FundingRecorded {
        account_id: AccountId,
        amount: MinorUnits,
    },
    FundingResolved {
        account_id: AccountId,
        amount: MinorUnits,
        outcome: FundingStatus,
    },
    TransferCompleted {
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: MinorUnits,
    },
}

/// Rebuild the change stream the log emitted for these rows, oldest first.
///
/// A funding row yields `FundingRecorded` at `created_at` and, once terminal,
/// `FundingResolved` at `settled_at`. A COMPLETED transfer yields
/// `TransferCompleted` at `processed_at`. Equal timestamps keep row order.
pub fn change_stream(events: &AccountEvents) -> Vec<LedgerChange> {
    let mut timed: Vec<(DateTime<Utc>, LedgerChange)> = Vec::new();

    for f in &events.funding {
        timed.push((
            f.created_at,
            LedgerChange::FundingRecorded {
                account_id: f.account_id,
                amount: f.amount,
            },
        ));
        if f.status.is_terminal() {
            timed.push((
                f.settled_at.unwrap_or(f.created_at),
                LedgerChange::FundingResolved {
                    account_id: f.account_id,
                    amount: f.amount,
                    outcome: f.status,
                },
            ));
        }
    }

    for t in events
        .transfers
        .iter()
        .filter(|t| t.status == TransferEventStatus::Completed)
    {
        timed.push((
            t.processed_at,
            LedgerChange::TransferCompleted {
                sender_id: t.sender_id,
                receiver_id: t.receiver_id,
                amount: t.amount,
            },
        ));
    }

    timed.sort_by_key(|(at, _)| *at);
    timed.into_iter().map(|(_, change)| change).collect()
}

/// Incremental projection: fold [`change_stream`] from account creation.
pub fn replay_events(
    account_id: AccountId,
    events: &AccountEvents,
) -> Result<Balance, BalanceOverflow> {
    change_stream(events)
        .iter()
        .try_fold(Balance::ZERO, |mut balance, change| {
            balance.apply(account_id, change)?;
            Ok(balance)
        })
}

/// Full-scan projection over the current log rows of one account
pub fn project_events(
    account_id: AccountId,
    events: &AccountEvents,
) -> Result<Balance, BalanceOverflow> {
    let mut balance = Balance::ZERO;

    for funding in events.funding.iter().filter(|f| f.account_id == account_id) {
        match funding.status {
            FundingStatus::Settled => balance.add_available(funding.amount)?,
            FundingStatus::Pending => balance.add_pending(funding.amount)?,
            FundingStatus::Failed => {}
        }
    }

    for transfer in events
        .transfers
        .iter()
        .filter(|t| t.status == TransferEventStatus::Completed)
    {
        if transfer.sender_id == account_id {
            balance.sub_available(transfer.amount)?;
        }
        if transfer.receiver_id == account_id {
            balance.add_available(transfer.amount)?;
        }
    }

    Ok(balance)
}

// ============================================================================
// BalanceProjector
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Balance arithmetic overflow for account {0}")]
    Overflow(AccountId),

    #[error(transparent)]
    Store(StoreError),
}

impl ProjectionError {
    pub fn code(&self) -> &'static str {
        match self {
            ProjectionError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            ProjectionError::Overflow(_) => "OVERFLOW",
            ProjectionError::Store(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ProjectionError::AccountNotFound(_) => 404,
            ProjectionError::Store(StoreError::Busy) => 503,
            ProjectionError::Overflow(_) | ProjectionError::Store(_) => 500,
        }
    }
}

impl From<StoreError> for ProjectionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => ProjectionError::AccountNotFound(id),
            StoreError::Overflow(id) => ProjectionError::Overflow(id),
            other => ProjectionError::Store(other),
        }
    }
}

/// Authoritative balance reader: replays the log, never consults snapshots.
#[derive(Clone)]
pub struct BalanceProjector {
    store: Arc<dyn LedgerStore>,
}

impl BalanceProjector {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Project `(available, pending)` for an account from its log rows.
    ///
    /// Unknown account → `AccountNotFound`.
    pub async fn project(&self, account_id: AccountId) -> Result<Balance, ProjectionError> {
        Ok(self.project_with_events(account_id).await?.0)
    }

    /// Projection together with the rows it was computed from
    pub async fn project_with_events(
        &self,
        account_id: AccountId,
    ) -> Result<(Balance, AccountEvents), ProjectionError> {
        if self.store.get_account(account_id).await?.is_none() {
            return Err(ProjectionError::AccountNotFound(account_id));
        }
        let events = self.store.account_events(account_id).await?;
        let balance = project_events(account_id, &events)
            .map_err(|_| ProjectionError::Overflow(account_id))?;
        Ok((balance, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{
        FundingEvent, IdempotencyToken, TransactionId, TransferEvent, TransferEventStatus,
    };
    use chrono::Utc;

    fn funding(id: i64, account_id: AccountId, amount: MinorUnits, status: FundingStatus) -> FundingEvent {
        FundingEvent {
            id,
            account_id,
            provider: "stripe".to_string(),
            amount,
            status,
            idempotency_token: IdempotencyToken::generate(),
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    fn transfer(id: i64, sender_id: AccountId, receiver_id: AccountId, amount: MinorUnits) -> TransferEvent {
        TransferEvent {
            id,
            transaction_id: TransactionId::new(),
            sender_id,
            receiver_id,
            amount,
            status: TransferEventStatus::Completed,
            description: String::new(),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_projection_formula() {
        let events = AccountEvents {
            funding: vec![
                funding(1, 1, 100_000, FundingStatus::Settled),
                funding(2, 1, 20_000, FundingStatus::Pending),
                funding(3, 1, 5_000, FundingStatus::Failed),
            ],
            transfers: vec![transfer(1, 1, 2, 30_000), transfer(2, 2, 1, 1_000)],
        };

        let balance = project_events(1, &events).unwrap();
        assert_eq!(balance, Balance::new(71_000, 20_000));
    }

    #[test]
    fn test_rejected_transfers_ignored() {
        let mut rejected = transfer(1, 1, 2, 500);
        rejected.status = TransferEventStatus::Rejected;
        let events = AccountEvents {
            funding: vec![funding(1, 1, 1_000, FundingStatus::Settled)],
            transfers: vec![rejected],
        };
        assert_eq!(project_events(1, &events).unwrap().available, 1_000);
    }

    #[test]
    fn test_foreign_funding_rows_ignored() {
        let events = AccountEvents {
            funding: vec![funding(1, 9, 1_000, FundingStatus::Settled)],
            transfers: vec![],
        };
        assert_eq!(project_events(1, &events).unwrap(), Balance::ZERO);
    }

    #[test]
    fn test_overflow_detected() {
        let events = AccountEvents {
            funding: vec![
                funding(1, 1, i64::MAX, FundingStatus::Settled),
                funding(2, 1, 1, FundingStatus::Settled),
            ],
            transfers: vec![],
        };
        assert_eq!(project_events(1, &events), Err(BalanceOverflow));
    }

    #[test]
    fn test_change_stream_follows_row_timestamps() {
        let t0 = Utc::now();
        let mut settled = funding(1, 1, 100_000, FundingStatus::Settled);
        settled.created_at = t0;
        settled.settled_at = Some(t0 + chrono::Duration::seconds(20));
        let mut pending = funding(2, 1, 20_000, FundingStatus::Pending);
        pending.created_at = t0 + chrono::Duration::seconds(5);
        let mut sent = transfer(1, 1, 2, 30_000);
        sent.processed_at = t0 + chrono::Duration::seconds(30);

        let events = AccountEvents {
            funding: vec![settled, pending],
            transfers: vec![sent],
        };
        assert_eq!(
            change_stream(&events),
            vec![
                LedgerChange::FundingRecorded { account_id: 1, amount: 100_000 },
                LedgerChange::FundingRecorded { account_id: 1, amount: 20_000 },
                LedgerChange::FundingResolved {
                    account_id: 1,
                    amount: 100_000,
                    outcome: FundingStatus::Settled
                },
                LedgerChange::TransferCompleted { sender_id: 1, receiver_id: 2, amount: 30_000 },
            ]
        );
        assert_eq!(replay_events(1, &events).unwrap(), Balance::new(70_000, 20_000));
    }

    #[test]
    fn test_change_stream_skips_rejected_transfers() {
        let mut rejected = transfer(1, 1, 2, 500);
        rejected.status = TransferEventStatus::Rejected;
        let events = AccountEvents {
            funding: vec![],
            transfers: vec![rejected],
        };
        assert!(change_stream(&events).is_empty());
    }

    #[test]
    fn test_apply_ignores_other_accounts() {
        let mut balance = Balance::new(10, 0);
        balance
            .apply(1, &LedgerChange::FundingRecorded { account_id: 2, amount: 5 })
            .unwrap();
        balance
            .apply(1, &LedgerChange::TransferCompleted { sender_id: 2, receiver_id: 3, amount: 5 })
            .unwrap();
        assert_eq!(balance, Balance::new(10, 0));
    }

    #[test]
    fn test_projection_error_mapping() {
        assert_eq!(
            ProjectionError::from(StoreError::AccountNotFound(3)),
            ProjectionError::AccountNotFound(3)
        );
        assert_eq!(ProjectionError::AccountNotFound(3).http_status(), 404);
        assert_eq!(ProjectionError::from(StoreError::Busy).http_status(), 503);
    }
}
