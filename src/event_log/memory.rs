//! In-memory ledger store
//!
//! All state sits behind one mutex. Every trait method runs as a single
//! critical section with no `.await` inside it, which makes each log append
//! and its snapshot rewrite one atomic unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::error::StoreError;
use super::store::LedgerStore;
use super::types::{
    AccountEvents, BalanceSnapshot, FundingAppend, FundingEvent, FundingStatus, FundingTransition,
    IdempotencyToken, NewFundingEvent, NewTransferEvent, TransferEvent, TransferEventStatus,
};
use crate::account::{Account, PhoneNumber};
use crate::balance::{Balance, project_events};
use crate::core_types::AccountId;

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    phones: HashMap<PhoneNumber, AccountId>,
    /// Row `i` has id `i + 1`
    funding: Vec<FundingEvent>,
    tokens: HashMap<IdempotencyToken, usize>,
    /// Row `i` has id `i + 1`
    transfers: Vec<TransferEvent>,
    snapshots: HashMap<AccountId, BalanceSnapshot>,
}

impl MemoryState {
    fn events_for(&self, account_id: AccountId) -> AccountEvents {
        AccountEvents {
            funding: self
                .funding
                .iter()
                .filter(|f| f.account_id == account_id)
                .cloned()
                .collect(),
            transfers: self
                .transfers
                .iter()
                .filter(|t| t.sender_id == account_id || t.receiver_id == account_id)
                .cloned()
                .collect(),
        }
    }

    fn project(&self, account_id: AccountId) -> Result<Balance, StoreError> {
        project_events(account_id, &self.events_for(account_id))
            .map_err(|_| StoreError::Overflow(account_id))
    }

    fn write_snapshot(
        &mut self,
        account_id: AccountId,
        balance: Balance,
        at: DateTime<Utc>,
    ) -> BalanceSnapshot {
        let version = self
            .snapshots
            .get(&account_id)
            .map(|s| s.version + 1)
            .unwrap_or(1);
        let snapshot = BalanceSnapshot {
            account_id,
            balance,
            version,
            updated_at: at,
        };
        self.snapshots.insert(account_id, snapshot);
        snapshot
    }

    fn require_account(&self, account_id: AccountId) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account_id) {
            Ok(())
        } else {
            Err(StoreError::AccountNotFound(account_id))
        }
    }
}

/// Ledger store backed by process memory
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("in-memory store poisoned".to_string()))
    }

    /// Overwrite a cached snapshot without touching the log (simulates drift)
    #[cfg(test)]
    pub(crate) fn overwrite_snapshot(&self, account_id: AccountId, balance: Balance) {
        let mut state = self.state.lock().unwrap();
        state.write_snapshot(account_id, balance, Utc::now());
    }

    /// Append a COMPLETED transfer row with no checks (simulates a tampered log)
    #[cfg(test)]
    pub(crate) fn push_raw_transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: i64,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = state.transfers.len() as i64 + 1;
        state.transfers.push(TransferEvent {
            id,
            transaction_id: super::types::TransactionId::new(),
            sender_id,
            receiver_id,
            amount,
            status: TransferEventStatus::Completed,
            description: "raw".to_string(),
            processed_at: Utc::now(),
        });
    }

    /// Total rows in both event tables
    #[cfg(test)]
    pub(crate) fn row_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.funding.len() + state.transfers.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_account(&self, phone: &PhoneNumber) -> Result<Account, StoreError> {
        let mut state = self.state()?;
        if state.phones.contains_key(phone) {
            return Err(StoreError::Conflict(format!(
                "phone {} already registered",
                phone.masked()
            )));
        }

        let account_id = state.accounts.keys().next_back().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        let account = Account {
            account_id,
            phone: phone.clone(),
            created_at: now,
        };
        state.accounts.insert(account_id, account.clone());
        state.phones.insert(phone.clone(), account_id);
        state.write_snapshot(account_id, Balance::ZERO, now);
        Ok(account)
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state()?.accounts.get(&account_id).cloned())
    }

    async fn find_account_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.state()?;
        Ok(state
            .phones
            .get(phone)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn list_account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        Ok(self.state()?.accounts.keys().copied().collect())
    }

    async fn account_events(&self, account_id: AccountId) -> Result<AccountEvents, StoreError> {
        Ok(self.state()?.events_for(account_id))
    }

    async fn funding_by_token(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<FundingEvent>, StoreError> {
        let state = self.state()?;
        Ok(state.tokens.get(token).map(|&idx| state.funding[idx].clone()))
    }

    async fn append_funding(&self, event: &NewFundingEvent) -> Result<FundingAppend, StoreError> {
        event.check()?;
        let mut state = self.state()?;
        state.require_account(event.account_id)?;

        if let Some(&idx) = state.tokens.get(&event.idempotency_token) {
            return Ok(FundingAppend::Existing(state.funding[idx].clone()));
        }

        let row = FundingEvent {
            id: state.funding.len() as i64 + 1,
            account_id: event.account_id,
            provider: event.provider.clone(),
            amount: event.amount,
            status: FundingStatus::Pending,
            idempotency_token: event.idempotency_token.clone(),
            created_at: event.created_at,
            settled_at: None,
        };
        state.funding.push(row.clone());

        let balance = match state.project(event.account_id) {
            Ok(b) => b,
            Err(e) => {
                state.funding.pop();
                return Err(e);
            }
        };
        let idx = state.funding.len() - 1;
        state.tokens.insert(row.idempotency_token.clone(), idx);
        state.write_snapshot(event.account_id, balance, event.created_at);
        Ok(FundingAppend::Created(row))
    }

    async fn resolve_funding(
        &self,
        token: &IdempotencyToken,
        outcome: FundingStatus,
        at: DateTime<Utc>,
    ) -> Result<FundingTransition, StoreError> {
        let mut state = self.state()?;
        let Some(&idx) = state.tokens.get(token) else {
            return Ok(FundingTransition::NotFound);
        };

        let previous = state.funding[idx].clone();
        if previous.status.is_terminal() {
            return Ok(FundingTransition::AlreadyTerminal(previous));
        }

        state.funding[idx].status = outcome;
        state.funding[idx].settled_at = Some(at);

        let balance = match state.project(previous.account_id) {
            Ok(b) => b,
            Err(e) => {
                state.funding[idx] = previous;
                return Err(e);
            }
        };
        state.write_snapshot(previous.account_id, balance, at);
        Ok(FundingTransition::Applied(state.funding[idx].clone()))
    }

    async fn append_transfer(
        &self,
        event: &NewTransferEvent,
    ) -> Result<TransferEvent, StoreError> {
        event.check()?;
        let mut state = self.state()?;
        state.require_account(event.sender_id)?;
        state.require_account(event.receiver_id)?;

        let sender_before = state.project(event.sender_id)?;
        if sender_before.available < event.amount {
            return Err(StoreError::Overdraft {
                available: sender_before.available,
                requested: event.amount,
            });
        }

        let row = TransferEvent {
            id: state.transfers.len() as i64 + 1,
            transaction_id: event.transaction_id,
            sender_id: event.sender_id,
            receiver_id: event.receiver_id,
            amount: event.amount,
            status: TransferEventStatus::Completed,
            description: event.description.clone(),
            processed_at: event.processed_at,
        };
        state.transfers.push(row.clone());

        // Both projections must succeed before either snapshot is written.
        let projected = match state.project(event.sender_id) {
            Ok(sender) => state
                .project(event.receiver_id)
                .map(|receiver| (sender, receiver)),
            Err(e) => Err(e),
        };
        let (sender, receiver) = match projected {
            Ok(pair) => pair,
            Err(e) => {
                state.transfers.pop();
                return Err(e);
            }
        };

        state.write_snapshot(event.sender_id, sender, event.processed_at);
        state.write_snapshot(event.receiver_id, receiver, event.processed_at);
        Ok(row)
    }

    async fn snapshot(&self, account_id: AccountId) -> Result<Option<BalanceSnapshot>, StoreError> {
        Ok(self.state()?.snapshots.get(&account_id).copied())
    }

    async fn refresh_snapshot(&self, account_id: AccountId) -> Result<BalanceSnapshot, StoreError> {
        let mut state = self.state()?;
        state.require_account(account_id)?;
        let balance = state.project(account_id)?;
        Ok(state.write_snapshot(account_id, balance, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn new_funding(account_id: AccountId, amount: i64, token: &str) -> NewFundingEvent {
        NewFundingEvent {
            account_id,
            provider: "stripe".to_string(),
            amount,
            idempotency_token: IdempotencyToken::parse(token).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn new_transfer(sender_id: AccountId, receiver_id: AccountId, amount: i64) -> NewTransferEvent {
        NewTransferEvent {
            transaction_id: crate::event_log::TransactionId::new(),
            sender_id,
            receiver_id,
            amount,
            description: "test".to_string(),
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_account_ids_are_sequential_and_phones_unique() {
        let store = InMemoryStore::new();
        let a = store.create_account(&phone("+911111111111")).await.unwrap();
        let b = store.create_account(&phone("+912222222222")).await.unwrap();
        assert_eq!((a.account_id, b.account_id), (1, 2));

        let dup = store.create_account(&phone("+91 1111-111111")).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let snapshot = store.snapshot(1).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_append_funding_is_idempotent_by_token() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();

        let first = store.append_funding(&new_funding(1, 500, "tok-1")).await.unwrap();
        let second = store.append_funding(&new_funding(1, 500, "tok-1")).await.unwrap();

        let FundingAppend::Created(created) = first else {
            panic!("expected Created");
        };
        assert_eq!(second, FundingAppend::Existing(created));
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.snapshot(1).await.unwrap().unwrap().balance.pending, 500);
    }

    #[tokio::test]
    async fn test_append_funding_unknown_account() {
        let store = InMemoryStore::new();
        let result = store.append_funding(&new_funding(42, 500, "tok-1")).await;
        assert_eq!(result, Err(StoreError::AccountNotFound(42)));
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_funding_cas() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();
        store.append_funding(&new_funding(1, 500, "tok-1")).await.unwrap();
        let token = IdempotencyToken::parse("tok-1").unwrap();

        let applied = store
            .resolve_funding(&token, FundingStatus::Settled, Utc::now())
            .await
            .unwrap();
        assert!(matches!(applied, FundingTransition::Applied(ref e) if e.status == FundingStatus::Settled));

        let replay = store
            .resolve_funding(&token, FundingStatus::Failed, Utc::now())
            .await
            .unwrap();
        assert!(matches!(replay, FundingTransition::AlreadyTerminal(ref e) if e.status == FundingStatus::Settled));

        let snapshot = store.snapshot(1).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, Balance::new(500, 0));

        let missing = IdempotencyToken::parse("nope").unwrap();
        assert_eq!(
            store
                .resolve_funding(&missing, FundingStatus::Settled, Utc::now())
                .await
                .unwrap(),
            FundingTransition::NotFound
        );
    }

    #[tokio::test]
    async fn test_append_transfer_guards_overdraft() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();
        store.create_account(&phone("+912222222222")).await.unwrap();

        let result = store.append_transfer(&new_transfer(1, 2, 1)).await;
        assert_eq!(
            result,
            Err(StoreError::Overdraft {
                available: 0,
                requested: 1
            })
        );
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.snapshot(1).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_rows_breaking_constraints_are_rejected() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();
        store.create_account(&phone("+912222222222")).await.unwrap();
        store.append_funding(&new_funding(1, 1_000, "tok-1")).await.unwrap();
        let before = store.snapshot(1).await.unwrap().unwrap();

        for amount in [0, -7] {
            let result = store.append_funding(&new_funding(1, amount, "tok-neg")).await;
            assert!(matches!(result, Err(StoreError::InvalidRow(_))), "funding {}", amount);
        }
        for (sender, receiver, amount) in [(1, 2, -50_000), (1, 2, 0), (1, 1, 10)] {
            let result = store.append_transfer(&new_transfer(sender, receiver, amount)).await;
            assert!(
                matches!(result, Err(StoreError::InvalidRow(_))),
                "{} -> {} ({})",
                sender,
                receiver,
                amount
            );
        }

        assert_eq!(store.row_count(), 1);
        assert_eq!(store.snapshot(1).await.unwrap().unwrap(), before);
        assert_eq!(store.snapshot(2).await.unwrap().unwrap().balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_append_transfer_updates_both_snapshots() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();
        store.create_account(&phone("+912222222222")).await.unwrap();
        store.append_funding(&new_funding(1, 1_000, "tok-1")).await.unwrap();
        store
            .resolve_funding(
                &IdempotencyToken::parse("tok-1").unwrap(),
                FundingStatus::Settled,
                Utc::now(),
            )
            .await
            .unwrap();

        let row = store.append_transfer(&new_transfer(1, 2, 400)).await.unwrap();
        assert_eq!(row.id, 1);
        assert_eq!(row.status, TransferEventStatus::Completed);

        assert_eq!(store.snapshot(1).await.unwrap().unwrap().balance.available, 600);
        assert_eq!(store.snapshot(2).await.unwrap().unwrap().balance.available, 400);
        assert_eq!(store.account_events(2).await.unwrap().transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_repairs_drift() {
        let store = InMemoryStore::new();
        store.create_account(&phone("+911111111111")).await.unwrap();
        store.overwrite_snapshot(1, Balance::new(999, 0));

        let refreshed = store.refresh_snapshot(1).await.unwrap();
        assert_eq!(refreshed.balance, Balance::ZERO);
        assert_eq!(
            store.refresh_snapshot(5).await,
            Err(StoreError::AccountNotFound(5))
        );
    }
}
