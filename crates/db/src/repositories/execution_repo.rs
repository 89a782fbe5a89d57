//! Repository for the `app_executions` table.
//!
//! `history` and `generation_ids` are JSONB maps keyed by the step order
//! as a string; entries are only ever added, never removed, so a
//! previously-recorded step's output survives later failures.

use pixelforge_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::app::{AppExecution, CreateExecution};
use crate::models::status::ExecutionStatus;

/// Column list for `app_executions` queries.
const COLUMNS: &str = "\
    id, app_id, user_id, status_id, current_step, \
    inputs, history, generation_ids, error_message, created_at, updated_at";

/// CRUD and transition operations for app executions.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Insert a new `pending` execution at step 1.
    pub async fn create(
        pool: &PgPool,
        input: &CreateExecution,
    ) -> Result<AppExecution, StoreError> {
        let query = format!(
            "INSERT INTO app_executions (app_id, user_id, status_id, current_step, inputs) \
             VALUES ($1, $2, $3, 1, $4) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(input.app_id)
            .bind(input.user_id)
            .bind(ExecutionStatus::Pending.id())
            .bind(&input.inputs)
            .fetch_one(pool)
            .await?)
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AppExecution>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM app_executions WHERE id = $1");
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// Set the execution status. Used for the non-terminal transitions
    /// (`processing`, `waiting_approval`).
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: ExecutionStatus,
    ) -> Result<AppExecution, StoreError> {
        let query = format!(
            "UPDATE app_executions SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_one(pool)
            .await?)
    }

    /// Terminal failure: record the message and mirror it into the
    /// history's reserved `"error"` slot.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<AppExecution, StoreError> {
        let query = format!(
            "UPDATE app_executions \
             SET status_id = $2, error_message = $3, \
                 history = jsonb_set(history, ARRAY['error'], to_jsonb($3::text)), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(id)
            .bind(ExecutionStatus::Failed.id())
            .bind(error_message)
            .fetch_one(pool)
            .await?)
    }

    /// Record a step's output (and the generation that produced it) into
    /// the history maps.
    pub async fn record_step_result(
        pool: &PgPool,
        id: DbId,
        step_order: i32,
        output: &Value,
        generation_id: Option<DbId>,
    ) -> Result<AppExecution, StoreError> {
        let key = step_order.to_string();
        let query = format!(
            "UPDATE app_executions \
             SET history = jsonb_set(history, ARRAY[$2::text], $3::jsonb), \
                 generation_ids = CASE \
                     WHEN $4::bigint IS NULL THEN generation_ids \
                     ELSE jsonb_set(generation_ids, ARRAY[$2::text], to_jsonb($4::bigint)) \
                 END, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(id)
            .bind(key)
            .bind(output)
            .bind(generation_id)
            .fetch_one(pool)
            .await?)
    }

    /// Advance `current_step` by one. The column is only ever incremented,
    /// keeping step progression monotonic.
    pub async fn advance_step(pool: &PgPool, id: DbId) -> Result<AppExecution, StoreError> {
        let query = format!(
            "UPDATE app_executions \
             SET current_step = current_step + 1, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AppExecution>(&query)
            .bind(id)
            .fetch_one(pool)
            .await?)
    }
}
