//! Repository for the `tasks` table: the DB-backed work queue.
//!
//! `claim_next` uses `SELECT FOR UPDATE SKIP LOCKED` so multiple worker
//! processes never double-claim a task. Delivery is at least once: a task
//! released for retry will be claimed again, so handlers must be
//! idempotent.

use std::time::Duration;

use pixelforge_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::status::TaskStatus;
use crate::models::task::Task;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, task_type, payload, status_id, run_at, attempts, max_attempts, \
    error_message, created_at, updated_at";

/// Default claim budget per task.
const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Queue operations for background tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Enqueue a task, optionally delayed.
    pub async fn enqueue(
        pool: &PgPool,
        task_type: &str,
        payload: &Value,
        delay: Option<Duration>,
    ) -> Result<Task, StoreError> {
        let delay_secs = delay.map(|d| d.as_secs_f64()).unwrap_or(0.0);
        let query = format!(
            "INSERT INTO tasks (task_type, payload, status_id, run_at, max_attempts) \
             VALUES ($1, $2, $3, NOW() + $4 * INTERVAL '1 second', $5) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Task>(&query)
            .bind(task_type)
            .bind(payload)
            .bind(TaskStatus::Pending.id())
            .bind(delay_secs)
            .bind(DEFAULT_MAX_ATTEMPTS)
            .fetch_one(pool)
            .await?)
    }

    /// Atomically claim the next due task.
    ///
    /// Increments `attempts` as part of the claim so the handler can see
    /// how many deliveries this task has had.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Task>, StoreError> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $1, attempts = attempts + 1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = $2 AND run_at <= NOW() \
                 ORDER BY run_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(TaskStatus::Pending.id())
            .fetch_optional(pool)
            .await?)
    }

    /// Mark a task as completed.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<(), StoreError> {
        sqlx::query("UPDATE tasks SET status_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(TaskStatus::Completed.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a task as permanently failed.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Release a claimed task back to pending after a transient handler
    /// failure, delayed so the retry does not hammer the failing
    /// dependency. The attempt count is preserved.
    pub async fn release_for_retry(
        pool: &PgPool,
        id: DbId,
        delay: Duration,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, run_at = NOW() + $3 * INTERVAL '1 second', \
                 error_message = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(TaskStatus::Pending.id())
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
