//! Transfer Coordinator
//!
//! Drives a peer-to-peer transfer from request to committed log row.
//!
//! ```text
//! validate → resolve receiver → lock(min id, max id) → project sender
//!          → check funds → append_transfer (row + both snapshots, atomic)
//! ```
//!
//! The sender's balance is only trusted once both account locks are held.
//! The store repeats the overdraft check inside its own atomic unit, which
//! covers writers in other processes sharing the same database.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::error::TransferError;
use super::types::TransferResult;
use crate::account::PhoneNumber;
use crate::balance::BalanceProjector;
use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::{LedgerStore, NewTransferEvent, TransactionId, TransferEvent};
use crate::locks::AccountLocks;
use crate::logging::TRACE_TARGET;

/// Transfer Coordinator - the only writer of transfer rows
pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    projector: BalanceProjector,
    locks: Arc<AccountLocks>,
    lock_wait: Duration,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<AccountLocks>, lock_wait: Duration) -> Self {
        Self {
            projector: BalanceProjector::new(store.clone()),
            store,
            locks,
            lock_wait,
        }
    }

    /// Move `amount` from `from` to the account registered for `to_phone`.
    ///
    /// On any error nothing has been written. Never retries; a `Busy` result
    /// may be resubmitted by the caller.
    pub async fn transfer(
        &self,
        from: AccountId,
        to_phone: &str,
        amount: MinorUnits,
    ) -> Result<TransferEvent, TransferError> {
        if amount <= 0 {
            return Err(TransferError::InvalidAmount);
        }
        let phone = PhoneNumber::parse(to_phone)
            .map_err(|e| TransferError::InvalidPhoneNumber(e.to_string()))?;

        let sender = self
            .store
            .get_account(from)
            .await?
            .ok_or(TransferError::AccountNotFound(from))?;
        let receiver = self
            .store
            .find_account_by_phone(&phone)
            .await?
            .ok_or_else(|| TransferError::RecipientNotFound(phone.masked()))?;

        if receiver.account_id == sender.account_id {
            return Err(TransferError::SelfTransfer);
        }

        let _guard = self
            .locks
            .acquire(&[sender.account_id, receiver.account_id], self.lock_wait)
            .await
            .inspect_err(|e| {
                warn!(
                    sender_id = sender.account_id,
                    receiver_id = receiver.account_id,
                    blocked_on = e.account_id,
                    "Transfer rejected: lock wait expired"
                );
            })?;

        // Fresh projection under the lock; any earlier read is stale.
        let available = self.projector.project(sender.account_id).await?.available;
        trace!(target: TRACE_TARGET, account_id = sender.account_id, available, "sender projected under lock");

        if available < amount {
            debug!(
                sender_id = sender.account_id,
                available,
                requested = amount,
                "Transfer rejected: insufficient funds"
            );
            return Err(TransferError::InsufficientFunds {
                available,
                requested: amount,
            });
        }

        let event = NewTransferEvent {
            transaction_id: TransactionId::new(),
            sender_id: sender.account_id,
            receiver_id: receiver.account_id,
            amount,
            description: format!("P2P transfer from {} to {}", sender.phone, receiver.phone),
            processed_at: Utc::now(),
        };

        let row = self
            .store
            .append_transfer(&event)
            .await
            .map_err(TransferError::from)
            .inspect_err(|e| match e {
                TransferError::Storage(msg) => error!(
                    transaction_id = %event.transaction_id,
                    error = %msg,
                    "Transfer commit failed"
                ),
                other => warn!(
                    transaction_id = %event.transaction_id,
                    code = other.code(),
                    "Transfer rejected by store"
                ),
            })?;

        info!(
            transaction_id = %row.transaction_id,
            sender_id = row.sender_id,
            receiver_id = row.receiver_id,
            amount = row.amount,
            "Transfer completed"
        );
        Ok(row)
    }

    /// [`Self::transfer`] folded into the caller-facing result shape
    pub async fn submit(&self, from: AccountId, to_phone: &str, amount: MinorUnits) -> TransferResult {
        self.transfer(from, to_phone, amount).await.into()
    }
}
