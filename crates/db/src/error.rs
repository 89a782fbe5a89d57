//! Persistence-layer error type.

use pixelforge_core::types::DbId;

/// Errors surfaced by repositories and the collaborator trait
/// implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Ledger withdrawal failed because the balance was too low,
    /// determined under the balance row lock.
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits {
        /// Balance observed under the lock.
        balance: i64,
        /// Amount the caller tried to withdraw.
        requested: i64,
    },

    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Human-readable entity kind.
        entity: &'static str,
        /// Database id that was looked up.
        id: DbId,
    },

    /// A JSON column failed to parse into its typed form.
    #[error("Malformed JSON column: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input failed a repository-level validation rule.
    #[error("Validation error: {0}")]
    Validation(String),
}
