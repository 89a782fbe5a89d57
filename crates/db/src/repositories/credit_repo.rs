//! The credit ledger: atomic balance mutation plus an append-only
//! transaction log.
//!
//! This is the only place in the core requiring strict mutual exclusion:
//! concurrent generations for the same user must not race on balance
//! checks. Every mutation locks the user's balance row with
//! `SELECT ... FOR UPDATE` before reading it, so the insufficient-funds
//! check and the write are atomic.

use pixelforge_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::credit::{CreditTransaction, TransactionType};

/// Column list for `credit_transactions` queries.
const COLUMNS: &str = "id, user_id, amount, tx_type, balance_after, metadata, created_at";

/// Ledger operations for user credit balances.
pub struct CreditRepo;

impl CreditRepo {
    /// Debit `amount` credits from a user.
    ///
    /// Fails with [`StoreError::InsufficientCredits`] when the balance,
    /// read under the row lock, is below `amount`. No transaction row is
    /// written on failure.
    pub async fn withdraw(
        pool: &PgPool,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        if amount <= 0 {
            return Err(StoreError::Validation(format!(
                "withdraw amount must be positive, got {amount}"
            )));
        }
        Self::mutate(pool, user_id, -amount, tx_type, metadata).await
    }

    /// Credit `amount` credits to a user.
    pub async fn deposit(
        pool: &PgPool,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        if amount <= 0 {
            return Err(StoreError::Validation(format!(
                "deposit amount must be positive, got {amount}"
            )));
        }
        Self::mutate(pool, user_id, amount, tx_type, metadata).await
    }

    /// Shared read-check-write under the balance row lock.
    async fn mutate(
        pool: &PgPool,
        user_id: DbId,
        signed_amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        let mut tx = pool.begin().await?;

        let balance: i64 =
            sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound {
                    entity: "user",
                    id: user_id,
                })?;

        let new_balance = balance + signed_amount;
        if new_balance < 0 {
            // Dropping `tx` rolls back; the lock is released untouched.
            return Err(StoreError::InsufficientCredits {
                balance,
                requested: -signed_amount,
            });
        }

        sqlx::query("UPDATE users SET credit_balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "INSERT INTO credit_transactions (user_id, amount, tx_type, balance_after, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(signed_amount)
            .bind(tx_type.as_str())
            .bind(new_balance)
            .bind(&metadata)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            user_id,
            amount = signed_amount,
            tx_type = tx_type.as_str(),
            balance_after = new_balance,
            "Ledger transaction recorded",
        );
        Ok(row)
    }

    /// The user's current balance.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "user",
                id: user_id,
            })
    }

    /// All ledger rows for a user, newest first.
    pub async fn transactions_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM credit_transactions \
             WHERE user_id = $1 ORDER BY id DESC"
        );
        Ok(sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await?)
    }
}
