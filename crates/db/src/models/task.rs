//! Background task queue models.
//!
//! Tasks are delivered at least once: a claim increments `attempts`, and a
//! handler that fails transiently releases the task back to pending with a
//! delay. Handlers must therefore tolerate redelivery.

use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    /// Handler discriminator, e.g. `"generation.poll"`.
    pub task_type: String,
    pub payload: Value,
    pub status_id: StatusId,
    /// Earliest time the task may be claimed.
    pub run_at: Timestamp,
    /// Number of times this task has been claimed.
    pub attempts: i32,
    /// Claims allowed before the task is marked failed.
    pub max_attempts: i32,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Whether another delivery attempt is allowed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
