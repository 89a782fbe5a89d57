//! User balance row. The orchestration core only ever touches the credit
//! balance; account data is owned elsewhere.

use pixelforge_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub email: String,
    /// Current credit balance. Mutated only under the ledger's row lock.
    pub credit_balance: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
