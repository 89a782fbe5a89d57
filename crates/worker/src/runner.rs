//! The claim loop: pulls due tasks off the queue and runs them.
//!
//! Several loops run in parallel; `SELECT FOR UPDATE SKIP LOCKED` in
//! [`TaskRepo::claim_next`] keeps them from double-claiming. A transient
//! handler failure releases the task back to pending with a delay while it
//! has attempts left; anything else marks it failed.

use std::sync::Arc;
use std::time::Duration;

use pixelforge_db::models::task::Task;
use pixelforge_db::repositories::TaskRepo;
use pixelforge_engine::TaskRunner;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Delay before a transiently failed task is retried.
const RETRY_DELAY: Duration = Duration::from_secs(10);

/// One queue consumer.
pub struct ClaimLoop {
    pool: PgPool,
    runner: Arc<TaskRunner>,
    poll_interval: Duration,
}

impl ClaimLoop {
    pub fn new(pool: PgPool, runner: Arc<TaskRunner>, poll_interval: Duration) -> Self {
        Self {
            pool,
            runner,
            poll_interval,
        }
    }

    /// Run until the cancellation token is triggered. A task in flight
    /// when shutdown starts is finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("claim loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.drain(&cancel).await;
                }
            }
        }
    }

    /// Claim and run tasks until the queue has nothing due.
    async fn drain(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let task = match TaskRepo::claim_next(&self.pool).await {
                Ok(Some(task)) => task,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "task claim failed");
                    return;
                }
            };
            self.run_one(task).await;
        }
    }

    async fn run_one(&self, task: Task) {
        tracing::debug!(
            task_id = task.id,
            task_type = %task.task_type,
            attempt = task.attempts,
            "task claimed"
        );

        match self.runner.run(&task).await {
            Ok(()) => {
                if let Err(e) = TaskRepo::complete(&self.pool, task.id).await {
                    tracing::error!(task_id = task.id, error = %e, "could not complete task");
                }
            }
            Err(e) if e.is_transient() && task.has_attempts_left() => {
                tracing::warn!(
                    task_id = task.id,
                    attempt = task.attempts,
                    error = %e,
                    "transient task failure, releasing for retry"
                );
                if let Err(release) =
                    TaskRepo::release_for_retry(&self.pool, task.id, RETRY_DELAY, &e.to_string())
                        .await
                {
                    tracing::error!(task_id = task.id, error = %release, "could not release task");
                }
            }
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "task failed");
                if let Err(fail) = TaskRepo::fail(&self.pool, task.id, &e.to_string()).await {
                    tracing::error!(task_id = task.id, error = %fail, "could not fail task");
                }
            }
        }
    }
}
