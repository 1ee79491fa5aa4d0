//! Funding: money entering the ledger from external payment providers
//!
//! Provider protocols stay outside; their glue calls
//! [`FundingService::record_initiated`] when a payment starts and
//! [`WebhookReconciler::reconcile`] when the provider reports the outcome.

pub mod error;
pub mod reconciler;
pub mod service;
pub mod types;

pub use error::FundingError;
pub use reconciler::WebhookReconciler;
pub use service::FundingService;
pub use types::{FundingReceipt, ProviderName, ReconcileResult};

pub use crate::event_log::IdempotencyToken;
