//! Credit ledger models.
//!
//! `credit_transactions` is append-only: rows are never mutated after
//! creation, and for a user the sum of all transaction amounts equals the
//! current balance (checked under the balance row lock).

use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

/// Ledger entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    /// Debit for a generation.
    Usage,
    /// Credit returned after a failed async generation.
    Refund,
    /// Credit purchased by the user.
    Purchase,
    /// Manual correction by an operator.
    Adjustment,
}

impl TransactionType {
    /// The string stored in the `tx_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::Purchase => "purchase",
            Self::Adjustment => "adjustment",
        }
    }
}

/// A row from the `credit_transactions` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    /// Signed amount: negative for withdrawals, positive for deposits.
    pub amount: i64,
    pub tx_type: String,
    /// The user's balance immediately after this transaction.
    pub balance_after: i64,
    pub metadata: Value,
    pub created_at: Timestamp,
}
