//! Per-account locks for in-process serialization.
//!
//! One async mutex per account, created on first use and kept in a DashMap.
//! Multi-account callers take every lock in ascending `AccountId` order, so
//! two transfers between the same pair in opposite directions cannot
//! deadlock. Each acquisition shares one deadline; running past it releases
//! everything already held and reports which account timed out.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use crate::core_types::AccountId;
use crate::logging::TRACE_TARGET;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Timed out waiting for lock on account {account_id}")]
pub struct LockTimeout {
    pub account_id: AccountId,
}

/// Held locks; dropping releases them all.
#[must_use]
pub struct AccountGuard {
    account_ids: Vec<AccountId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    /// Locked accounts, ascending
    pub fn account_ids(&self) -> &[AccountId] {
        &self.account_ids
    }
}

#[derive(Default)]
pub struct AccountLocks {
    slots: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        self.slots
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock every account in `account_ids` (duplicates collapse) in ascending
    /// order, waiting at most `wait` in total.
    pub async fn acquire(
        &self,
        account_ids: &[AccountId],
        wait: Duration,
    ) -> Result<AccountGuard, LockTimeout> {
        let mut ordered = account_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let started = Instant::now();
        let deadline = started + wait;
        let mut guards = Vec::with_capacity(ordered.len());

        for &account_id in &ordered {
            let slot = self.slot(account_id);
            match timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    trace!(
                        target: TRACE_TARGET,
                        account_id,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "lock wait expired"
                    );
                    return Err(LockTimeout { account_id });
                }
            }
        }

        trace!(
            target: TRACE_TARGET,
            accounts = ?ordered,
            waited_us = started.elapsed().as_micros() as u64,
            "locks acquired"
        );

        Ok(AccountGuard {
            account_ids: ordered,
            _guards: guards,
        })
    }

    /// Number of accounts that have ever been locked
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
