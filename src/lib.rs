//! Gold Ledger - Ledger & Transfer Engine for a custodial gold-token wallet
//!
//! Balances are never stored as mutable counters. They are projected from an
//! append-only log of funding events and transfer events, with a per-account
//! snapshot cached next to the log and rewritten in the same atomic unit.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId, MinorUnits, etc.)
//! - [`account`] - Accounts and phone-number addressing
//! - [`event_log`] - Log rows, the `LedgerStore` trait and its backends
//! - [`balance`] - The single balance formula and `BalanceProjector`
//! - [`snapshot`] - Read-optimized snapshot cache
//! - [`locks`] - Ordered per-account locks with bounded wait
//! - [`transfer`] - Peer-to-peer `TransferCoordinator`
//! - [`funding`] - Funding ingestion and `WebhookReconciler`
//! - [`history`] - Merged activity feed
//! - [`ledger`] - Facade wiring everything to one store

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod balance;
pub mod event_log;
pub mod funding;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod snapshot;
pub mod transfer;

// Infrastructure
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use balance::{Balance, BalanceProjector, ProjectionError};
pub use core_types::{AccountId, FundingEventId, MinorUnits, TransferEventId};
pub use event_log::{FundingStatus, InMemoryStore, LedgerStore, PgStore, StoreError, TransactionId};
pub use funding::{FundingError, FundingReceipt, ReconcileResult, WebhookReconciler};
pub use ledger::{AuditReport, Ledger, NegativeBalance};
pub use snapshot::BalanceSnapshotStore;
pub use transfer::{TransferCoordinator, TransferError, TransferResult, TransferStatus};
