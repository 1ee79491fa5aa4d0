//! Ledger - the boundary the rest of the wallet talks to
//!
//! Wires one store and one lock table into every component so that
//! transfers, funding and reconciliation serialize on the same per-account
//! locks.
//!
//! | Boundary | Method |
//! |---|---|
//! | signup | [`Ledger::open_account`] |
//! | provider glue | [`Ledger::record_funding_initiated`], [`Ledger::reconcile`] |
//! | UI / API | [`Ledger::transfer`], [`Ledger::get_balance`], [`Ledger::history`] |
//! | recovery | [`Ledger::rebuild_snapshots`], [`Ledger::audit`] |

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::account::{Account, AccountError, PhoneNumber};
use crate::balance::{Balance, BalanceProjector, ProjectionError, replay_events};
use crate::config::LedgerConfig;
use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::{FundingStatus, LedgerStore};
use crate::funding::{FundingError, FundingReceipt, FundingService, ReconcileResult, WebhookReconciler};
use crate::history::{ActivityEntry, account_activity, counterparties};
use crate::locks::AccountLocks;
use crate::snapshot::{BalanceSnapshotStore, SnapshotCheck};
use crate::transfer::{TransferCoordinator, TransferResult};

/// An account whose projected balance went below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NegativeBalance {
    pub account_id: AccountId,
    pub balance: Balance,
}

/// Result of [`Ledger::audit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub accounts_checked: usize,
    /// Accounts whose cached snapshot differs from a fresh projection
    pub drifted: Vec<SnapshotCheck>,
    /// Accounts with `available < 0` or `pending < 0`
    pub negative: Vec<NegativeBalance>,
    /// Accounts where change-stream replay disagrees with the full scan
    pub replay_mismatch: Vec<AccountId>,
    pub total_available: MinorUnits,
    pub total_pending: MinorUnits,
    pub total_settled_funding: MinorUnits,
}

impl AuditReport {
    /// Transfers only move value: Σ available must equal Σ settled funding.
    pub fn is_conserved(&self) -> bool {
        self.total_available == self.total_settled_funding
    }

    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty()
            && self.negative.is_empty()
            && self.replay_mismatch.is_empty()
            && self.is_conserved()
    }
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    projector: BalanceProjector,
    snapshots: BalanceSnapshotStore,
    coordinator: TransferCoordinator,
    funding: FundingService,
    reconciler: WebhookReconciler,
    history_limit: usize,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        let locks = Arc::new(AccountLocks::new());
        let lock_wait = config.lock_wait();
        Self {
            projector: BalanceProjector::new(store.clone()),
            snapshots: BalanceSnapshotStore::new(store.clone()),
            coordinator: TransferCoordinator::new(store.clone(), locks.clone(), lock_wait),
            funding: FundingService::new(store.clone(), locks.clone(), lock_wait),
            reconciler: WebhookReconciler::new(store.clone(), locks, lock_wait),
            history_limit: config.history_limit,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Register an account under a unique phone number.
    pub async fn open_account(&self, phone: &str) -> Result<Account, AccountError> {
        let phone = PhoneNumber::parse(phone)?;
        let account = self.store.create_account(&phone).await?;
        info!(
            account_id = account.account_id,
            phone = %phone.masked(),
            "Account opened"
        );
        Ok(account)
    }

    /// Record a PENDING funding event under a freshly generated token.
    pub async fn record_funding_initiated(
        &self,
        account_id: AccountId,
        provider: &str,
        amount: MinorUnits,
    ) -> Result<FundingReceipt, FundingError> {
        self.funding
            .record_initiated(account_id, provider, amount, None)
            .await
    }

    /// Record a PENDING funding event under the provider's own reference.
    pub async fn record_funding_with_token(
        &self,
        account_id: AccountId,
        provider: &str,
        amount: MinorUnits,
        token: &str,
    ) -> Result<FundingReceipt, FundingError> {
        self.funding
            .record_initiated(account_id, provider, amount, Some(token))
            .await
    }

    pub async fn reconcile(
        &self,
        token: &str,
        outcome: FundingStatus,
    ) -> Result<ReconcileResult, FundingError> {
        self.reconciler.reconcile(token, outcome).await
    }

    pub async fn transfer(
        &self,
        from: AccountId,
        to_phone: &str,
        amount: MinorUnits,
    ) -> TransferResult {
        self.coordinator.submit(from, to_phone, amount).await
    }

    /// Display balance from the snapshot cache
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Balance, ProjectionError> {
        self.snapshots.get(account_id).await
    }

    /// Authoritative balance from a full log replay
    pub async fn project_balance(&self, account_id: AccountId) -> Result<Balance, ProjectionError> {
        self.projector.project(account_id).await
    }

    /// Newest-first activity; `limit` defaults to `history_limit`.
    pub async fn history(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<ActivityEntry>, ProjectionError> {
        let (_, events) = self.projector.project_with_events(account_id).await?;
        let mut phones = HashMap::new();
        for id in counterparties(account_id, &events) {
            if let Some(account) = self.store.get_account(id).await? {
                phones.insert(id, account.phone);
            }
        }
        Ok(account_activity(
            account_id,
            &events,
            &phones,
            limit.unwrap_or(self.history_limit),
        ))
    }

    /// Re-derive every snapshot from the log (restart recovery).
    pub async fn rebuild_snapshots(&self) -> Result<usize, ProjectionError> {
        self.snapshots.rebuild_all().await
    }

    /// Compare every snapshot with the log, replay each account's change
    /// stream, and check for negative balances and conservation.
    pub async fn audit(&self) -> Result<AuditReport, ProjectionError> {
        let account_ids = self.store.list_account_ids().await?;
        let mut drifted = Vec::new();
        let mut negative = Vec::new();
        let mut replay_mismatch = Vec::new();
        let mut total_available: MinorUnits = 0;
        let mut total_pending: MinorUnits = 0;
        let mut total_settled_funding: MinorUnits = 0;

        for &account_id in &account_ids {
            let (derived, events) = self.projector.project_with_events(account_id).await?;
            let cached = self.store.snapshot(account_id).await?.map(|s| s.balance);
            let check = SnapshotCheck {
                account_id,
                cached,
                derived,
            };
            if !check.is_consistent() {
                drifted.push(check);
            }
            if derived.available < 0 || derived.pending < 0 {
                negative.push(NegativeBalance {
                    account_id,
                    balance: derived,
                });
            }
            let replayed = replay_events(account_id, &events)
                .map_err(|_| ProjectionError::Overflow(account_id))?;
            if replayed != derived {
                replay_mismatch.push(account_id);
            }

            let settled = events
                .funding
                .iter()
                .filter(|f| f.status == FundingStatus::Settled)
                .try_fold(0i64, |acc, f| acc.checked_add(f.amount));
            let overflow = || ProjectionError::Overflow(account_id);
            total_settled_funding = settled
                .and_then(|s| total_settled_funding.checked_add(s))
                .ok_or_else(overflow)?;
            total_available = total_available
                .checked_add(derived.available)
                .ok_or_else(overflow)?;
            total_pending = total_pending
                .checked_add(derived.pending)
                .ok_or_else(overflow)?;
        }

        let report = AuditReport {
            accounts_checked: account_ids.len(),
            drifted,
            negative,
            replay_mismatch,
            total_available,
            total_pending,
            total_settled_funding,
        };

        if report.is_clean() {
            info!(accounts = report.accounts_checked, total_available, "Ledger audit clean");
        } else {
            warn!(
                accounts = report.accounts_checked,
                drifted = report.drifted.len(),
                negative = report.negative.len(),
                replay_mismatch = report.replay_mismatch.len(),
                total_available,
                total_settled_funding,
                "Ledger audit found inconsistencies"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryStore;
    use crate::history::ActivityKind;
    use crate::transfer::TransferStatus;

    async fn ledger() -> (Arc<InMemoryStore>, Ledger) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Ledger::new(store.clone(), &LedgerConfig::default());
        ledger.open_account("+91 90000 00001").await.unwrap();
        ledger.open_account("+91 90000 00002").await.unwrap();
        (store, ledger)
    }

    async fn settle(ledger: &Ledger, account_id: AccountId, amount: MinorUnits) {
        let receipt = ledger
            .record_funding_initiated(account_id, "stripe", amount)
            .await
            .unwrap();
        ledger
            .reconcile(receipt.idempotency_token.as_str(), FundingStatus::Settled)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_account_rejects_duplicates() {
        let (_store, ledger) = ledger().await;
        assert!(matches!(
            ledger.open_account("+919000000001").await,
            Err(AccountError::PhoneTaken)
        ));
        assert!(matches!(
            ledger.open_account("12").await,
            Err(AccountError::InvalidPhone(_))
        ));
    }

    #[tokio::test]
    async fn test_history_merges_streams() {
        let (_store, ledger) = ledger().await;
        settle(&ledger, 1, 5_000).await;
        let result = ledger.transfer(1, "+919000000002", 1_200).await;
        assert_eq!(result.status, TransferStatus::Completed);

        let sender = ledger.history(1, None).await.unwrap();
        assert_eq!(sender.len(), 2);
        assert_eq!(sender[0].kind, ActivityKind::Sent { to: 2 });
        assert_eq!(
            sender[0].reference,
            result.transaction_id.unwrap().to_string()
        );

        assert_eq!(sender[0].description, "Sent to +919000000002");

        let receiver = ledger.history(2, Some(5)).await.unwrap();
        assert_eq!(receiver[0].kind, ActivityKind::Received { from: 1 });
        assert_eq!(receiver[0].description, "Received from +919000000001");

        assert_eq!(
            ledger.history(9, None).await,
            Err(ProjectionError::AccountNotFound(9))
        );
    }

    #[tokio::test]
    async fn test_audit_detects_tampered_snapshot() {
        let (store, ledger) = ledger().await;
        settle(&ledger, 1, 10_000).await;
        ledger.transfer(1, "+919000000002", 4_000).await;

        let clean = ledger.audit().await.unwrap();
        assert!(clean.is_clean());
        assert_eq!(clean.total_available, 10_000);

        store.overwrite_snapshot(2, Balance::new(999_999, 0));
        let report = ledger.audit().await.unwrap();
        assert!(!report.is_clean());
        assert!(report.is_conserved());
        assert_eq!(report.drifted.len(), 1);
        assert_eq!(report.drifted[0].account_id, 2);
        assert_eq!(report.drifted[0].derived, Balance::new(4_000, 0));
        assert_eq!(ledger.get_balance(2).await.unwrap(), Balance::new(999_999, 0));

        assert_eq!(ledger.rebuild_snapshots().await.unwrap(), 2);
        assert!(ledger.audit().await.unwrap().is_clean());
        assert_eq!(ledger.get_balance(2).await.unwrap(), Balance::new(4_000, 0));
    }

    #[tokio::test]
    async fn test_audit_flags_negative_balance() {
        let (store, ledger) = ledger().await;
        settle(&ledger, 1, 1_000).await;

        // A row written straight into the log, bypassing every check.
        store.push_raw_transfer(2, 1, 50_000);
        ledger.rebuild_snapshots().await.unwrap();

        let report = ledger.audit().await.unwrap();
        assert!(report.drifted.is_empty());
        assert!(report.is_conserved());
        assert_eq!(
            report.negative,
            vec![NegativeBalance {
                account_id: 2,
                balance: Balance::new(-50_000, 0),
            }]
        );
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_audit_replays_change_stream() {
        let (_store, ledger) = ledger().await;
        settle(&ledger, 1, 8_000).await;
        ledger
            .record_funding_initiated(2, "razorpay", 300)
            .await
            .unwrap();
        ledger.transfer(1, "+919000000002", 2_500).await;

        let report = ledger.audit().await.unwrap();
        assert!(report.replay_mismatch.is_empty());
        assert!(report.negative.is_empty());
        assert_eq!(report.total_pending, 300);
        assert!(report.is_clean());
    }
}
