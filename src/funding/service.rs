use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::error::FundingError;
use super::types::{FundingReceipt, ProviderName};
use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::{FundingAppend, IdempotencyToken, LedgerStore, NewFundingEvent};
use crate::locks::AccountLocks;

/// Funding ingestion: provider glue records a payment as PENDING here and
/// later settles it through the `WebhookReconciler`.
pub struct FundingService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    lock_wait: Duration,
}

impl FundingService {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<AccountLocks>, lock_wait: Duration) -> Self {
        Self {
            store,
            locks,
            lock_wait,
        }
    }

    /// Record a PENDING funding event.
    ///
    /// With `token = None` a fresh token is generated. A provider-supplied
    /// token that is already recorded returns the stored event if account and
    /// amount match, and `TokenConflict` otherwise.
    pub async fn record_initiated(
        &self,
        account_id: AccountId,
        provider: &str,
        amount: MinorUnits,
        token: Option<&str>,
    ) -> Result<FundingReceipt, FundingError> {
        if amount <= 0 {
            return Err(FundingError::InvalidAmount);
        }
        let provider: ProviderName = provider.parse()?;
        let idempotency_token = match token {
            Some(raw) => IdempotencyToken::parse(raw)
                .map_err(|e| FundingError::InvalidToken(e.to_string()))?,
            None => IdempotencyToken::generate(),
        };

        if self.store.get_account(account_id).await?.is_none() {
            return Err(FundingError::AccountNotFound(account_id));
        }
        let _guard = self.locks.acquire(&[account_id], self.lock_wait).await?;

        let appended = self
            .store
            .append_funding(&NewFundingEvent {
                account_id,
                provider: provider.as_str().to_string(),
                amount,
                idempotency_token: idempotency_token.clone(),
                created_at: Utc::now(),
            })
            .await?;

        match appended {
            FundingAppend::Created(event) => {
                info!(
                    account_id,
                    funding_event_id = event.id,
                    provider = %provider,
                    amount,
                    token = %event.idempotency_token,
                    "Funding initiated"
                );
                Ok(FundingReceipt::from_event(&event, true))
            }
            FundingAppend::Existing(event)
                if event.account_id == account_id && event.amount == amount =>
            {
                info!(
                    account_id,
                    funding_event_id = event.id,
                    token = %event.idempotency_token,
                    "Funding already recorded"
                );
                Ok(FundingReceipt::from_event(&event, false))
            }
            FundingAppend::Existing(event) => {
                warn!(
                    account_id,
                    stored_account_id = event.account_id,
                    amount,
                    stored_amount = event.amount,
                    token = %event.idempotency_token,
                    "Idempotency token reused with different parameters"
                );
                Err(FundingError::TokenConflict(
                    event.idempotency_token.to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PhoneNumber;
    use crate::balance::Balance;
    use crate::event_log::{FundingStatus, InMemoryStore};

    async fn service() -> (Arc<InMemoryStore>, FundingService) {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_account(&PhoneNumber::parse("+911111111111").unwrap())
            .await
            .unwrap();
        store
            .create_account(&PhoneNumber::parse("+912222222222").unwrap())
            .await
            .unwrap();
        let service = FundingService::new(
            store.clone(),
            Arc::new(AccountLocks::new()),
            Duration::from_millis(100),
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_record_generates_token() {
        let (store, service) = service().await;
        let receipt = service.record_initiated(1, "Stripe", 20_000, None).await.unwrap();

        assert!(receipt.created);
        assert_eq!(receipt.status, FundingStatus::Pending);
        assert_eq!(receipt.idempotency_token.as_str().len(), 32);
        assert_eq!(
            store.snapshot(1).await.unwrap().unwrap().balance,
            Balance::new(0, 20_000)
        );

        let stored = store
            .funding_by_token(&receipt.idempotency_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provider, "stripe");
    }

    #[tokio::test]
    async fn test_supplied_token_is_idempotent() {
        let (store, service) = service().await;
        let first = service
            .record_initiated(1, "razorpay", 500, Some("order_abc"))
            .await
            .unwrap();
        let again = service
            .record_initiated(1, "razorpay", 500, Some("order_abc"))
            .await
            .unwrap();

        assert!(!again.created);
        assert_eq!(again.funding_event_id, first.funding_event_id);
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.snapshot(1).await.unwrap().unwrap().balance.pending, 500);
    }

    #[tokio::test]
    async fn test_token_conflict() {
        let (store, service) = service().await;
        service
            .record_initiated(1, "razorpay", 500, Some("order_abc"))
            .await
            .unwrap();

        let other_amount = service.record_initiated(1, "razorpay", 700, Some("order_abc")).await;
        assert_eq!(
            other_amount,
            Err(FundingError::TokenConflict("order_abc".to_string()))
        );
        let other_account = service.record_initiated(2, "razorpay", 500, Some("order_abc")).await;
        assert!(matches!(other_account, Err(FundingError::TokenConflict(_))));
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (store, service) = service().await;
        assert_eq!(
            service.record_initiated(1, "stripe", 0, None).await,
            Err(FundingError::InvalidAmount)
        );
        assert!(matches!(
            service.record_initiated(1, "", 10, None).await,
            Err(FundingError::InvalidProvider(_))
        ));
        assert!(matches!(
            service.record_initiated(1, "stripe", 10, Some("has space")).await,
            Err(FundingError::InvalidToken(_))
        ));
        assert_eq!(
            service.record_initiated(9, "stripe", 10, None).await,
            Err(FundingError::AccountNotFound(9))
        );
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_account_takes_no_lock_slot() {
        let store = Arc::new(InMemoryStore::new());
        let locks = Arc::new(AccountLocks::new());
        let service = FundingService::new(store, locks.clone(), Duration::from_millis(100));

        for account_id in 100..110 {
            assert_eq!(
                service.record_initiated(account_id, "stripe", 10, None).await,
                Err(FundingError::AccountNotFound(account_id))
            );
        }
        assert!(locks.is_empty());
    }
}
