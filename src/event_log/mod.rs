//! Event Log - append-only funding and transfer history
//!
//! The log is the only source of truth for money. Funding rows change status
//! exactly once (PENDING → SETTLED | FAILED); transfer rows are written
//! COMPLETED and never change. Snapshots live next to the log and are
//! rewritten in the same atomic unit as the row that changed them.
//!
//! Two backends implement [`LedgerStore`]:
//! - [`InMemoryStore`] for tests and single-process runs
//! - [`PgStore`] for PostgreSQL (`migrations/0001_ledger.sql`)

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::LedgerStore;
pub use types::{
    AccountEvents, BalanceSnapshot, FundingAppend, FundingEvent, FundingStatus, FundingTransition,
    IdempotencyToken, NewFundingEvent, NewTransferEvent, TransactionId, TransferEvent,
    TransferEventStatus,
};
