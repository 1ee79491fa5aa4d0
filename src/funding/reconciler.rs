//! Webhook reconciliation
//!
//! Providers deliver callbacks at least once and in any order. A callback is
//! matched to its funding row by idempotency token and moves it
//! PENDING → SETTLED | FAILED exactly once; every later delivery is a no-op
//! that reports the outcome recorded first.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::FundingError;
use super::types::ReconcileResult;
use crate::event_log::{FundingEvent, FundingStatus, FundingTransition, IdempotencyToken, LedgerStore};
use crate::locks::AccountLocks;

pub struct WebhookReconciler {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    lock_wait: Duration,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<AccountLocks>, lock_wait: Duration) -> Self {
        Self {
            store,
            locks,
            lock_wait,
        }
    }

    /// Apply a provider outcome to the funding event behind `token`.
    pub async fn reconcile(
        &self,
        token: &str,
        outcome: FundingStatus,
    ) -> Result<ReconcileResult, FundingError> {
        if !outcome.is_terminal() {
            return Err(FundingError::InvalidOutcome(outcome));
        }
        let token = IdempotencyToken::parse(token)
            .map_err(|e| FundingError::InvalidToken(e.to_string()))?;

        let event = self
            .store
            .funding_by_token(&token)
            .await?
            .ok_or_else(|| FundingError::UnknownFundingEvent(token.to_string()))?;

        // Fast path for redelivery; no lock needed to observe a terminal row.
        if event.status.is_terminal() {
            return Ok(replayed(&event, outcome));
        }

        let _guard = self.locks.acquire(&[event.account_id], self.lock_wait).await?;

        match self.store.resolve_funding(&token, outcome, Utc::now()).await? {
            FundingTransition::Applied(applied) => {
                info!(
                    account_id = applied.account_id,
                    funding_event_id = applied.id,
                    token = %applied.idempotency_token,
                    amount = applied.amount,
                    status = %applied.status,
                    "Funding reconciled"
                );
                Ok(ReconcileResult::from_event(&applied, true))
            }
            FundingTransition::AlreadyTerminal(stored) => Ok(replayed(&stored, outcome)),
            FundingTransition::NotFound => Err(FundingError::UnknownFundingEvent(token.to_string())),
        }
    }
}

fn replayed(stored: &FundingEvent, outcome: FundingStatus) -> ReconcileResult {
    if stored.status != outcome {
        warn!(
            funding_event_id = stored.id,
            token = %stored.idempotency_token,
            recorded = %stored.status,
            delivered = %outcome,
            "Conflicting webhook outcome ignored"
        );
    } else {
        debug!(
            funding_event_id = stored.id,
            token = %stored.idempotency_token,
            "Duplicate webhook ignored"
        );
    }
    ReconcileResult::from_event(stored, false)
}
