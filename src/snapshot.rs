//! Balance snapshot cache
//!
//! Read-optimized view of the projection. Every write path in the store
//! rewrites the snapshot in the same unit as the log row, so a reader sees
//! either the old or the new value, never a torn one. The cache is never the
//! arbiter: [`BalanceSnapshotStore::verify`] compares it against a fresh
//! [`BalanceProjector`] pass and [`BalanceSnapshotStore::refresh`] overwrites
//! it from the log.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::balance::{Balance, BalanceProjector, ProjectionError};
use crate::core_types::AccountId;
use crate::event_log::{BalanceSnapshot, LedgerStore};

/// Cached vs. derived balance of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotCheck {
    pub account_id: AccountId,
    pub cached: Option<Balance>,
    pub derived: Balance,
}

impl SnapshotCheck {
    pub fn is_consistent(&self) -> bool {
        self.cached == Some(self.derived)
    }
}

#[derive(Clone)]
pub struct BalanceSnapshotStore {
    store: Arc<dyn LedgerStore>,
    projector: BalanceProjector,
}

impl BalanceSnapshotStore {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let projector = BalanceProjector::new(store.clone());
        Self { store, projector }
    }

    /// Cached balance; a missing snapshot is rebuilt from the log first.
    pub async fn get(&self, account_id: AccountId) -> Result<Balance, ProjectionError> {
        match self.store.snapshot(account_id).await? {
            Some(snapshot) => Ok(snapshot.balance),
            None => Ok(self.refresh(account_id).await?.balance),
        }
    }

    /// Recompute from the log and overwrite
    pub async fn refresh(&self, account_id: AccountId) -> Result<BalanceSnapshot, ProjectionError> {
        let snapshot = self.store.refresh_snapshot(account_id).await?;
        debug!(
            account_id,
            available = snapshot.balance.available,
            pending = snapshot.balance.pending,
            version = snapshot.version,
            "Snapshot refreshed"
        );
        Ok(snapshot)
    }

    /// Refresh every account; returns how many were rewritten.
    pub async fn rebuild_all(&self) -> Result<usize, ProjectionError> {
        let account_ids = self.store.list_account_ids().await?;
        for &account_id in &account_ids {
            self.refresh(account_id).await?;
        }
        info!(accounts = account_ids.len(), store = self.store.name(), "Snapshots rebuilt from log");
        Ok(account_ids.len())
    }

    /// Compare the cached snapshot with an authoritative projection.
    pub async fn verify(&self, account_id: AccountId) -> Result<SnapshotCheck, ProjectionError> {
        let derived = self.projector.project(account_id).await?;
        let cached = self.store.snapshot(account_id).await?.map(|s| s.balance);
        let check = SnapshotCheck {
            account_id,
            cached,
            derived,
        };
        if !check.is_consistent() {
            warn!(account_id, cached = ?cached, derived = ?derived, "Snapshot drift detected");
        }
        Ok(check)
    }
}
