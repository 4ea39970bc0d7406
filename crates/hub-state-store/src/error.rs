//! Store-local error type

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StateStoreError>;

impl From<StateStoreError> for hub_core::HubError {
    fn from(err: StateStoreError) -> Self {
        match err {
            StateStoreError::NotFound(msg) => hub_core::HubError::NotFound(msg),
            other => hub_core::HubError::Persistence(other.to_string()),
        }
    }
}
