//! Background task types and dispatch.
//!
//! Every deferred piece of work travels through the task queue as a typed
//! JSON payload. [`TaskRunner`] is the single dispatch point the worker
//! hands claimed tasks to.

use std::sync::Arc;

use pixelforge_core::types::DbId;
use pixelforge_db::models::task::Task;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::poller::CompletionPoller;
use crate::workflow::WorkflowEngine;

/// Poll a long-running generation.
pub const GENERATION_POLL: &str = "generation.poll";
/// Run the next step of an app execution.
pub const EXECUTION_STEP: &str = "execution.step";
/// Resume an execution after one of its generations reached a terminal
/// state asynchronously.
pub const EXECUTION_RESUME: &str = "execution.resume";

/// Payload of a [`GENERATION_POLL`] task.
///
/// `poll_count` counts business reschedules ("still processing");
/// `transient_attempts` counts consecutive infrastructure failures. The
/// two budgets are deliberately separate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollPayload {
    pub generation_id: DbId,
    #[serde(default)]
    pub execution_id: Option<DbId>,
    #[serde(default)]
    pub poll_count: u32,
    #[serde(default)]
    pub transient_attempts: u32,
}

/// Payload of an [`EXECUTION_STEP`] task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPayload {
    pub execution_id: DbId,
    #[serde(default)]
    pub skip_approval: bool,
}

/// Payload of an [`EXECUTION_RESUME`] task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub execution_id: DbId,
    pub generation_id: DbId,
}

/// Routes claimed tasks to the engine that handles them.
pub struct TaskRunner {
    poller: Arc<CompletionPoller>,
    workflow: Arc<WorkflowEngine>,
}

impl TaskRunner {
    pub fn new(poller: Arc<CompletionPoller>, workflow: Arc<WorkflowEngine>) -> Self {
        Self { poller, workflow }
    }

    /// Run one claimed task to completion.
    pub async fn run(&self, task: &Task) -> Result<(), EngineError> {
        match task.task_type.as_str() {
            GENERATION_POLL => {
                let payload: PollPayload = serde_json::from_value(task.payload.clone())?;
                self.poller.poll(&payload).await
            }
            EXECUTION_STEP => {
                let payload: StepPayload = serde_json::from_value(task.payload.clone())?;
                self.workflow
                    .execute_next_step(payload.execution_id, payload.skip_approval)
                    .await
            }
            EXECUTION_RESUME => {
                let payload: ResumePayload = serde_json::from_value(task.payload.clone())?;
                self.workflow
                    .resume_from_generation(payload.execution_id, payload.generation_id)
                    .await
            }
            other => Err(EngineError::Configuration(format!(
                "unknown task type '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn poll_payload_counters_default_to_zero() {
        let payload: PollPayload =
            serde_json::from_value(json!({"generation_id": 5})).unwrap();
        assert_eq!(payload.generation_id, 5);
        assert_eq!(payload.poll_count, 0);
        assert_eq!(payload.transient_attempts, 0);
        assert!(payload.execution_id.is_none());
    }

    #[test]
    fn step_payload_defaults_to_gated() {
        let payload: StepPayload =
            serde_json::from_value(json!({"execution_id": 9})).unwrap();
        assert!(!payload.skip_approval);
    }
}
