//! Core types used throughout the ledger
//!
//! These are fundamental type aliases shared by every module. They match the
//! `BIGINT` columns of the PostgreSQL schema one-to-one.

/// Account ID - stable surrogate key assigned at signup.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Never deleted**: accounts outlive every event that references them
/// - **Totally ordered**: lock acquisition order is ascending `AccountId`
pub type AccountId = i64;

/// Funding event ID - surrogate key of a row in the funding log
pub type FundingEventId = i64;

/// Transfer event ID - surrogate key of a row in the transfer log
pub type TransferEventId = i64;

/// Monetary amount in minor currency units (e.g. paise).
///
/// Signed so that drift between a cached snapshot and the log is
/// representable; every amount written to the log is strictly positive.
pub type MinorUnits = i64;
