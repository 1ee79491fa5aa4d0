use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::FundingError;
use crate::core_types::{AccountId, FundingEventId, MinorUnits};
use crate::event_log::{FundingEvent, FundingStatus, IdempotencyToken};

/// Payment provider name, normalized to lowercase (`stripe`, `razorpay`, `bank_redirect`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProviderName(String);

impl ProviderName {
    pub const MAX_LEN: usize = 32;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProviderName {
    type Err = FundingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let valid = !name.is_empty()
            && name.len() <= Self::MAX_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(FundingError::InvalidProvider(s.to_string()));
        }
        Ok(Self(name))
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returned by `record_initiated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingReceipt {
    pub funding_event_id: FundingEventId,
    pub idempotency_token: IdempotencyToken,
    pub status: FundingStatus,
    /// False when the token was already recorded and the stored row is returned
    pub created: bool,
}

impl FundingReceipt {
    pub(crate) fn from_event(event: &FundingEvent, created: bool) -> Self {
        Self {
            funding_event_id: event.id,
            idempotency_token: event.idempotency_token.clone(),
            status: event.status,
            created,
        }
    }
}

/// Returned by `reconcile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub funding_event_id: FundingEventId,
    pub account_id: AccountId,
    pub amount: MinorUnits,
    /// Recorded outcome; on replay this is the first outcome, not the redelivered one
    pub status: FundingStatus,
    /// False for a replayed callback
    pub applied: bool,
}

impl ReconcileResult {
    pub(crate) fn from_event(event: &FundingEvent, applied: bool) -> Self {
        Self {
            funding_event_id: event.id,
            account_id: event.account_id,
            amount: event.amount,
            status: event.status,
            applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_normalized() {
        let p: ProviderName = "  Stripe ".parse().unwrap();
        assert_eq!(p.as_str(), "stripe");
        assert_eq!("bank_redirect".parse::<ProviderName>().unwrap().as_str(), "bank_redirect");
    }

    #[test]
    fn test_provider_rejected() {
        assert!("".parse::<ProviderName>().is_err());
        assert!("pay pal".parse::<ProviderName>().is_err());
        assert!("x".repeat(33).parse::<ProviderName>().is_err());
    }
}
