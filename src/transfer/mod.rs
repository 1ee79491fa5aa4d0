//! Peer-to-peer transfers
//!
//! A transfer debits one account and credits another, addressed by phone
//! number. It either commits one COMPLETED transfer row together with both
//! balance snapshots, or writes nothing.
//!
//! # Safety Invariants
//!
//! 1. **Lock-Before-Read**: the sender's balance is projected only after both
//!    account locks are held
//! 2. **Ordered Locks**: accounts are locked in ascending id order
//! 3. **Bounded Wait**: lock acquisition past `lock_wait_ms` fails with `Busy`
//! 4. **No Silent Retry**: a failed transfer is reported, never re-attempted

pub mod coordinator;
pub mod error;
pub mod types;

pub use coordinator::TransferCoordinator;
pub use error::TransferError;
pub use types::{TransferResult, TransferStatus};

pub use crate::event_log::TransactionId;
