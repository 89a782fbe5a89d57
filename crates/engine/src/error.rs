//! Engine error taxonomy.
//!
//! The distinction that matters operationally is transient vs. terminal:
//! the task layer retries transient failures against its attempt budget and
//! treats everything else as final.

use pixelforge_core::types::DbId;
use pixelforge_db::StoreError;
use pixelforge_providers::ProviderError;
use pixelforge_storage::StorageError;

/// Errors from the orchestration engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Broken model/provider/app configuration. Fixed in config, not by
    /// retrying traffic.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// An operation was attempted from a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Bad caller input (unrenderable template values, malformed fields).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The ledger rejected a withdrawal.
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },

    /// The provider call failed; carries the request/response detail.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A long-running operation finished in a failed state.
    #[error("Async operation failed: {0}")]
    AsyncOperation(String),

    /// Infrastructure blip worth retrying (storage or network).
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    /// Persistence failure other than insufficient credits.
    #[error(transparent)]
    Store(StoreError),

    /// Blob storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Task payload (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientCredits { balance, requested } => {
                Self::InsufficientCredits { balance, requested }
            }
            StoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Store(other),
        }
    }
}

impl From<pixelforge_core::CoreError> for EngineError {
    fn from(e: pixelforge_core::CoreError) -> Self {
        match e {
            pixelforge_core::CoreError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl EngineError {
    /// Whether the task layer should retry this failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Provider(ProviderError::Http(_)) => true,
            Self::Store(StoreError::Database(_)) => true,
            Self::Storage(StorageError::Io(_)) => true,
            _ => false,
        }
    }
}
