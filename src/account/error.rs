use thiserror::Error;

use super::validation::ValidationError;
use crate::event_log::StoreError;

#[derive(Error, Debug, Clone)]
pub enum AccountError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(#[from] ValidationError),

    #[error("Phone number already registered")]
    PhoneTaken,

    #[error(transparent)]
    Store(StoreError),
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::InvalidPhone(_) => "INVALID_PHONE_NUMBER",
            AccountError::PhoneTaken => "PHONE_TAKEN",
            AccountError::Store(e) => e.code(),
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AccountError::PhoneTaken,
            other => AccountError::Store(other),
        }
    }
}
