//! Collaborator traits the engines are injected with, plus their
//! Postgres implementation.
//!
//! The engines never touch a pool directly; they receive these traits as
//! `Arc<dyn ...>`, which keeps every component's dependencies visible and
//! lets tests swap in in-memory fakes. [`PgStore`] implements all of them
//! by delegating to the repositories.

use std::time::Duration;

use pixelforge_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::app::{App, AppExecution, AppStep, CreateExecution};
use crate::models::credit::{CreditTransaction, TransactionType};
use crate::models::generation::{CreateGeneration, Generation, GenerationCost};
use crate::models::model::{AiModel, ModelProviderLink};
use crate::models::status::ExecutionStatus;
use crate::repositories::{
    AppRepo, CreditRepo, ExecutionRepo, GenerationRepo, ModelRepo, TaskRepo,
};

/// Read-only model/app configuration lookups.
#[async_trait::async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn model(&self, id: DbId) -> Result<Option<AiModel>, StoreError>;
    async fn primary_link(&self, model_id: DbId)
        -> Result<Option<ModelProviderLink>, StoreError>;
    async fn link(&self, id: DbId) -> Result<Option<ModelProviderLink>, StoreError>;
    async fn app(&self, id: DbId) -> Result<Option<App>, StoreError>;
    async fn step_at(&self, app_id: DbId, step_order: i32)
        -> Result<Option<AppStep>, StoreError>;
}

/// Persistence for generations.
#[async_trait::async_trait]
pub trait GenerationStore: Send + Sync {
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError>;
    async fn reset_for_retry(
        &self,
        id: DbId,
        input: &CreateGeneration,
    ) -> Result<Generation, StoreError>;
    async fn find(&self, id: DbId) -> Result<Option<Generation>, StoreError>;
    async fn set_request_body(&self, id: DbId, request_body: &Value) -> Result<(), StoreError>;
    async fn mark_processing(
        &self,
        id: DbId,
        output_data: &Value,
        cost: &GenerationCost,
    ) -> Result<Generation, StoreError>;
    async fn complete(
        &self,
        id: DbId,
        output_data: &Value,
        cost: Option<&GenerationCost>,
    ) -> Result<Generation, StoreError>;
    async fn fail(
        &self,
        id: DbId,
        error_message: &str,
        output_data: Option<&Value>,
    ) -> Result<Generation, StoreError>;
}

/// Persistence for app executions.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(&self, input: &CreateExecution) -> Result<AppExecution, StoreError>;
    async fn find(&self, id: DbId) -> Result<Option<AppExecution>, StoreError>;
    async fn set_status(
        &self,
        id: DbId,
        status: ExecutionStatus,
    ) -> Result<AppExecution, StoreError>;
    async fn mark_failed(&self, id: DbId, error_message: &str)
        -> Result<AppExecution, StoreError>;
    async fn record_step_result(
        &self,
        id: DbId,
        step_order: i32,
        output: &Value,
        generation_id: Option<DbId>,
    ) -> Result<AppExecution, StoreError>;
    async fn advance_step(&self, id: DbId) -> Result<AppExecution, StoreError>;
}

/// The credit ledger: atomic, row-locked balance mutation.
#[async_trait::async_trait]
pub trait CreditLedger: Send + Sync {
    async fn withdraw(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError>;
    async fn deposit(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError>;
    async fn balance(&self, user_id: DbId) -> Result<i64, StoreError>;
}

/// The job dispatch collaborator: at-least-once task delivery.
#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, optionally delayed. Returns the task id.
    async fn enqueue(
        &self,
        task_type: &str,
        payload: Value,
        delay: Option<Duration>,
    ) -> Result<DbId, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// Implements every collaborator trait over one `PgPool`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for the worker's claim loop.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ModelCatalog for PgStore {
    async fn model(&self, id: DbId) -> Result<Option<AiModel>, StoreError> {
        ModelRepo::find_by_id(&self.pool, id).await
    }

    async fn primary_link(
        &self,
        model_id: DbId,
    ) -> Result<Option<ModelProviderLink>, StoreError> {
        ModelRepo::primary_link(&self.pool, model_id).await
    }

    async fn link(&self, id: DbId) -> Result<Option<ModelProviderLink>, StoreError> {
        ModelRepo::find_link_by_id(&self.pool, id).await
    }

    async fn app(&self, id: DbId) -> Result<Option<App>, StoreError> {
        AppRepo::find_by_id(&self.pool, id).await
    }

    async fn step_at(
        &self,
        app_id: DbId,
        step_order: i32,
    ) -> Result<Option<AppStep>, StoreError> {
        AppRepo::step_at(&self.pool, app_id, step_order).await
    }
}

#[async_trait::async_trait]
impl GenerationStore for PgStore {
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        GenerationRepo::create(&self.pool, input).await
    }

    async fn reset_for_retry(
        &self,
        id: DbId,
        input: &CreateGeneration,
    ) -> Result<Generation, StoreError> {
        GenerationRepo::reset_for_retry(&self.pool, id, input).await
    }

    async fn find(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        GenerationRepo::find_by_id(&self.pool, id).await
    }

    async fn set_request_body(&self, id: DbId, request_body: &Value) -> Result<(), StoreError> {
        GenerationRepo::set_request_body(&self.pool, id, request_body).await
    }

    async fn mark_processing(
        &self,
        id: DbId,
        output_data: &Value,
        cost: &GenerationCost,
    ) -> Result<Generation, StoreError> {
        GenerationRepo::mark_processing(&self.pool, id, output_data, cost).await
    }

    async fn complete(
        &self,
        id: DbId,
        output_data: &Value,
        cost: Option<&GenerationCost>,
    ) -> Result<Generation, StoreError> {
        GenerationRepo::complete(&self.pool, id, output_data, cost).await
    }

    async fn fail(
        &self,
        id: DbId,
        error_message: &str,
        output_data: Option<&Value>,
    ) -> Result<Generation, StoreError> {
        GenerationRepo::fail(&self.pool, id, error_message, output_data).await
    }
}

#[async_trait::async_trait]
impl ExecutionStore for PgStore {
    async fn create(&self, input: &CreateExecution) -> Result<AppExecution, StoreError> {
        ExecutionRepo::create(&self.pool, input).await
    }

    async fn find(&self, id: DbId) -> Result<Option<AppExecution>, StoreError> {
        ExecutionRepo::find_by_id(&self.pool, id).await
    }

    async fn set_status(
        &self,
        id: DbId,
        status: ExecutionStatus,
    ) -> Result<AppExecution, StoreError> {
        ExecutionRepo::set_status(&self.pool, id, status).await
    }

    async fn mark_failed(
        &self,
        id: DbId,
        error_message: &str,
    ) -> Result<AppExecution, StoreError> {
        ExecutionRepo::mark_failed(&self.pool, id, error_message).await
    }

    async fn record_step_result(
        &self,
        id: DbId,
        step_order: i32,
        output: &Value,
        generation_id: Option<DbId>,
    ) -> Result<AppExecution, StoreError> {
        ExecutionRepo::record_step_result(&self.pool, id, step_order, output, generation_id).await
    }

    async fn advance_step(&self, id: DbId) -> Result<AppExecution, StoreError> {
        ExecutionRepo::advance_step(&self.pool, id).await
    }
}

#[async_trait::async_trait]
impl CreditLedger for PgStore {
    async fn withdraw(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        CreditRepo::withdraw(&self.pool, user_id, amount, tx_type, metadata).await
    }

    async fn deposit(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        CreditRepo::deposit(&self.pool, user_id, amount, tx_type, metadata).await
    }

    async fn balance(&self, user_id: DbId) -> Result<i64, StoreError> {
        CreditRepo::balance(&self.pool, user_id).await
    }
}

#[async_trait::async_trait]
impl TaskQueue for PgStore {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: Value,
        delay: Option<Duration>,
    ) -> Result<DbId, StoreError> {
        let task = TaskRepo::enqueue(&self.pool, task_type, &payload, delay).await?;
        Ok(task.id)
    }
}
