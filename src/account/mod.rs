//! Account management module
//!
//! Accounts are identified by a numeric id and addressed by phone number.

pub mod error;
pub mod models;
pub mod validation;

pub use error::AccountError;
pub use models::Account;
pub use validation::{PhoneNumber, ValidationError};
