//! In-memory fakes for the engine integration tests.
//!
//! One `FakeStore` implements every persistence collaborator over a single
//! mutex-guarded state, so a test can wire all three engines against the
//! same data and inspect everything afterwards.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pixelforge_core::types::DbId;
use pixelforge_db::error::StoreError;
use pixelforge_db::models::app::{App, AppExecution, AppStep, CreateExecution};
use pixelforge_db::models::credit::{CreditTransaction, TransactionType};
use pixelforge_db::models::generation::{CreateGeneration, Generation, GenerationCost};
use pixelforge_db::models::model::{AiModel, ModelProviderLink};
use pixelforge_db::models::status::{ExecutionStatus, GenerationStatus};
use pixelforge_db::store::{
    CreditLedger, ExecutionStore, GenerationStore, ModelCatalog, TaskQueue,
};
use pixelforge_engine::gateway::ProviderGateway;
use pixelforge_engine::{CompletionPoller, GenerationEngine, WorkflowEngine};
use pixelforge_events::{Notifier, PlatformEvent};
use pixelforge_providers::adapter::{
    GenerationContext, OperationStatus, ProviderConfig, ProviderOutcome, ProviderResponse,
};
use pixelforge_providers::ProviderError;
use pixelforge_storage::MemoryBlobStore;
use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

pub struct QueuedTask {
    pub task_type: String,
    pub payload: Value,
    pub delay: Option<Duration>,
}

#[derive(Default)]
pub struct State {
    pub models: HashMap<DbId, AiModel>,
    pub links: Vec<ModelProviderLink>,
    pub apps: HashMap<DbId, App>,
    pub steps: Vec<AppStep>,
    pub generations: HashMap<DbId, Generation>,
    pub executions: HashMap<DbId, AppExecution>,
    pub balances: HashMap<DbId, i64>,
    pub transactions: Vec<CreditTransaction>,
    pub tasks: Vec<QueuedTask>,
    next_id: DbId,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // -- seeding --

    pub fn add_model(&self, name: &str, modality: &str) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.models.insert(
            id,
            AiModel {
                id,
                name: name.to_string(),
                modality: modality.to_string(),
                created_at: chrono::Utc::now(),
            },
        );
        id
    }

    pub fn add_link(
        &self,
        model_id: DbId,
        provider: &str,
        schema: Value,
        cost_strategy: Option<Value>,
    ) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.links.push(ModelProviderLink {
            id,
            model_id,
            provider: provider.to_string(),
            provider_model_id: "test-model-v1".to_string(),
            is_primary: true,
            api_key_env: None,
            base_url: None,
            cost_strategy,
            schema,
            created_at: chrono::Utc::now(),
        });
        id
    }

    pub fn add_app(&self, name: &str) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.apps.insert(
            id,
            App {
                id,
                name: name.to_string(),
                created_at: chrono::Utc::now(),
            },
        );
        id
    }

    pub fn add_step(
        &self,
        app_id: DbId,
        step_order: i32,
        model_id: DbId,
        prompt_template: &str,
        config: Value,
        requires_approval: bool,
    ) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.steps.push(AppStep {
            id,
            app_id,
            step_order,
            model_id,
            prompt_template: prompt_template.to_string(),
            config,
            requires_approval,
        });
        id
    }

    pub fn set_balance(&self, user_id: DbId, balance: i64) {
        self.lock().balances.insert(user_id, balance);
    }

    /// Seed a generation already in `processing`, the way the poller finds
    /// one.
    pub fn seed_processing_generation(
        &self,
        user_id: DbId,
        model_id: DbId,
        provider_link_id: DbId,
        operation_name: &str,
        user_credit_cost: i64,
    ) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.generations.insert(
            id,
            Generation {
                id,
                user_id,
                model_id,
                provider_link_id,
                status_id: GenerationStatus::Processing.id(),
                input_data: json!({}),
                output_data: Some(json!({"operationName": operation_name})),
                provider_request_body: None,
                provider_cost_usd: Some(0.1),
                user_credit_cost: Some(user_credit_cost),
                profit_usd: Some(0.0),
                error_message: None,
                parent_generation_id: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
        );
        id
    }

    // -- inspection --

    pub fn generation(&self, id: DbId) -> Generation {
        self.lock().generations[&id].clone()
    }

    pub fn execution(&self, id: DbId) -> AppExecution {
        self.lock().executions[&id].clone()
    }

    pub fn balance_of(&self, user_id: DbId) -> i64 {
        *self.lock().balances.get(&user_id).unwrap_or(&0)
    }

    pub fn transactions(&self) -> Vec<CreditTransaction> {
        self.lock().transactions.clone()
    }

    pub fn tasks(&self) -> Vec<(String, Value, Option<Duration>)> {
        self.lock()
            .tasks
            .iter()
            .map(|t| (t.task_type.clone(), t.payload.clone(), t.delay))
            .collect()
    }

    pub fn drain_tasks(&self) -> Vec<(String, Value)> {
        self.lock()
            .tasks
            .drain(..)
            .map(|t| (t.task_type, t.payload))
            .collect()
    }
}

#[async_trait::async_trait]
impl ModelCatalog for FakeStore {
    async fn model(&self, id: DbId) -> Result<Option<AiModel>, StoreError> {
        Ok(self.lock().models.get(&id).cloned())
    }

    async fn primary_link(
        &self,
        model_id: DbId,
    ) -> Result<Option<ModelProviderLink>, StoreError> {
        Ok(self
            .lock()
            .links
            .iter()
            .find(|l| l.model_id == model_id && l.is_primary)
            .cloned())
    }

    async fn link(&self, id: DbId) -> Result<Option<ModelProviderLink>, StoreError> {
        Ok(self.lock().links.iter().find(|l| l.id == id).cloned())
    }

    async fn app(&self, id: DbId) -> Result<Option<App>, StoreError> {
        Ok(self.lock().apps.get(&id).cloned())
    }

    async fn step_at(
        &self,
        app_id: DbId,
        step_order: i32,
    ) -> Result<Option<AppStep>, StoreError> {
        Ok(self
            .lock()
            .steps
            .iter()
            .find(|s| s.app_id == app_id && s.step_order == step_order)
            .cloned())
    }
}

#[async_trait::async_trait]
impl GenerationStore for FakeStore {
    async fn create(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        let mut state = self.lock();
        let id = state.next_id();
        let generation = Generation {
            id,
            user_id: input.user_id,
            model_id: input.model_id,
            provider_link_id: input.provider_link_id,
            status_id: GenerationStatus::Pending.id(),
            input_data: input.input_data.clone(),
            output_data: None,
            provider_request_body: None,
            provider_cost_usd: None,
            user_credit_cost: None,
            profit_usd: None,
            error_message: None,
            parent_generation_id: input.parent_generation_id,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        state.generations.insert(id, generation.clone());
        Ok(generation)
    }

    async fn reset_for_retry(
        &self,
        id: DbId,
        input: &CreateGeneration,
    ) -> Result<Generation, StoreError> {
        let mut state = self.lock();
        let generation = state.generations.get_mut(&id);
        let Some(generation) = generation
            .filter(|g| g.user_id == input.user_id)
            .filter(|g| g.status_id == GenerationStatus::Failed.id())
        else {
            return Err(StoreError::Validation(format!(
                "generation {id} cannot be retried: only the owner's failed generations qualify"
            )));
        };
        generation.status_id = GenerationStatus::Pending.id();
        generation.provider_link_id = input.provider_link_id;
        generation.input_data = input.input_data.clone();
        generation.output_data = None;
        generation.provider_request_body = None;
        generation.error_message = None;
        generation.provider_cost_usd = None;
        generation.user_credit_cost = None;
        generation.profit_usd = None;
        Ok(generation.clone())
    }

    async fn find(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        Ok(self.lock().generations.get(&id).cloned())
    }

    async fn set_request_body(&self, id: DbId, request_body: &Value) -> Result<(), StoreError> {
        let mut state = self.lock();
        let generation = state
            .generations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "generation", id })?;
        generation.provider_request_body = Some(request_body.clone());
        Ok(())
    }

    async fn mark_processing(
        &self,
        id: DbId,
        output_data: &Value,
        cost: &GenerationCost,
    ) -> Result<Generation, StoreError> {
        let mut state = self.lock();
        let generation = state
            .generations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "generation", id })?;
        generation.status_id = GenerationStatus::Processing.id();
        generation.output_data = Some(output_data.clone());
        generation.provider_cost_usd = Some(cost.provider_cost_usd);
        generation.user_credit_cost = Some(cost.user_credit_cost);
        generation.profit_usd = Some(cost.profit_usd);
        Ok(generation.clone())
    }

    async fn complete(
        &self,
        id: DbId,
        output_data: &Value,
        cost: Option<&GenerationCost>,
    ) -> Result<Generation, StoreError> {
        let mut state = self.lock();
        let generation = state
            .generations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "generation", id })?;
        generation.status_id = GenerationStatus::Completed.id();
        generation.output_data = Some(output_data.clone());
        if let Some(cost) = cost {
            generation.provider_cost_usd = Some(cost.provider_cost_usd);
            generation.user_credit_cost = Some(cost.user_credit_cost);
            generation.profit_usd = Some(cost.profit_usd);
        }
        Ok(generation.clone())
    }

    async fn fail(
        &self,
        id: DbId,
        error_message: &str,
        output_data: Option<&Value>,
    ) -> Result<Generation, StoreError> {
        let mut state = self.lock();
        let generation = state
            .generations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "generation", id })?;
        generation.status_id = GenerationStatus::Failed.id();
        generation.error_message = Some(error_message.to_string());
        if let Some(output) = output_data {
            generation.output_data = Some(output.clone());
        }
        Ok(generation.clone())
    }
}

#[async_trait::async_trait]
impl ExecutionStore for FakeStore {
    async fn create(&self, input: &CreateExecution) -> Result<AppExecution, StoreError> {
        let mut state = self.lock();
        let id = state.next_id();
        let execution = AppExecution {
            id,
            app_id: input.app_id,
            user_id: input.user_id,
            status_id: ExecutionStatus::Pending.id(),
            current_step: 1,
            inputs: input.inputs.clone(),
            history: json!({}),
            generation_ids: json!({}),
            error_message: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        state.executions.insert(id, execution.clone());
        Ok(execution)
    }

    async fn find(&self, id: DbId) -> Result<Option<AppExecution>, StoreError> {
        Ok(self.lock().executions.get(&id).cloned())
    }

    async fn set_status(
        &self,
        id: DbId,
        status: ExecutionStatus,
    ) -> Result<AppExecution, StoreError> {
        let mut state = self.lock();
        let execution = state
            .executions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "execution", id })?;
        execution.status_id = status.id();
        Ok(execution.clone())
    }

    async fn mark_failed(
        &self,
        id: DbId,
        error_message: &str,
    ) -> Result<AppExecution, StoreError> {
        let mut state = self.lock();
        let execution = state
            .executions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "execution", id })?;
        execution.status_id = ExecutionStatus::Failed.id();
        execution.error_message = Some(error_message.to_string());
        Ok(execution.clone())
    }

    async fn record_step_result(
        &self,
        id: DbId,
        step_order: i32,
        output: &Value,
        generation_id: Option<DbId>,
    ) -> Result<AppExecution, StoreError> {
        let mut state = self.lock();
        let execution = state
            .executions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "execution", id })?;
        execution.history[step_order.to_string()] = output.clone();
        if let Some(generation_id) = generation_id {
            execution.generation_ids[step_order.to_string()] = json!(generation_id);
        }
        Ok(execution.clone())
    }

    async fn advance_step(&self, id: DbId) -> Result<AppExecution, StoreError> {
        let mut state = self.lock();
        let execution = state
            .executions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "execution", id })?;
        execution.current_step += 1;
        Ok(execution.clone())
    }
}

#[async_trait::async_trait]
impl CreditLedger for FakeStore {
    async fn withdraw(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        if amount <= 0 {
            return Err(StoreError::Validation("amount must be positive".into()));
        }
        let mut state = self.lock();
        let balance = *state.balances.get(&user_id).unwrap_or(&0);
        if balance < amount {
            return Err(StoreError::InsufficientCredits {
                balance,
                requested: amount,
            });
        }
        let balance_after = balance - amount;
        state.balances.insert(user_id, balance_after);
        let id = state.next_id();
        let tx = CreditTransaction {
            id,
            user_id,
            amount: -amount,
            tx_type: tx_type.as_str().to_string(),
            balance_after,
            metadata,
            created_at: chrono::Utc::now(),
        };
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn deposit(
        &self,
        user_id: DbId,
        amount: i64,
        tx_type: TransactionType,
        metadata: Value,
    ) -> Result<CreditTransaction, StoreError> {
        if amount <= 0 {
            return Err(StoreError::Validation("amount must be positive".into()));
        }
        let mut state = self.lock();
        let balance_after = *state.balances.get(&user_id).unwrap_or(&0) + amount;
        state.balances.insert(user_id, balance_after);
        let id = state.next_id();
        let tx = CreditTransaction {
            id,
            user_id,
            amount,
            tx_type: tx_type.as_str().to_string(),
            balance_after,
            metadata,
            created_at: chrono::Utc::now(),
        };
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn balance(&self, user_id: DbId) -> Result<i64, StoreError> {
        Ok(*self.lock().balances.get(&user_id).unwrap_or(&0))
    }
}

#[async_trait::async_trait]
impl TaskQueue for FakeStore {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: Value,
        delay: Option<Duration>,
    ) -> Result<DbId, StoreError> {
        let mut state = self.lock();
        let id = state.next_id();
        state.tasks.push(QueuedTask {
            task_type: task_type.to_string(),
            payload,
            delay,
        });
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// FakeNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeNotifier {
    pub events: Mutex<Vec<PlatformEvent>>,
}

impl FakeNotifier {
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for FakeNotifier {
    async fn publish(&self, event: PlatformEvent, target_user_id: DbId) {
        self.events
            .lock()
            .unwrap()
            .push(event.with_target(target_user_id));
    }
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

/// Scripted provider gateway: each call pops the next queued response.
#[derive(Default)]
pub struct FakeGateway {
    pub responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    pub statuses: Mutex<VecDeque<Result<OperationStatus, ProviderError>>>,
    pub downloads: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    pub generate_calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl FakeGateway {
    pub fn push_response(&self, response: Result<ProviderResponse, ProviderError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, status: Result<OperationStatus, ProviderError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn push_download(&self, download: Result<Vec<u8>, ProviderError>) {
        self.downloads.lock().unwrap().push_back(download);
    }

    pub fn generate_calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.generate_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProviderGateway for FakeGateway {
    async fn generate(
        &self,
        provider: &str,
        _config: &ProviderConfig,
        fields: &Map<String, Value>,
        _ctx: GenerationContext,
    ) -> Result<ProviderResponse, ProviderError> {
        self.generate_calls
            .lock()
            .unwrap()
            .push((provider.to_string(), fields.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted generate response left")
    }

    async fn check_status(
        &self,
        _provider: &str,
        _config: &ProviderConfig,
        _operation_name: &str,
    ) -> Result<OperationStatus, ProviderError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted status left")
    }

    async fn download(
        &self,
        _provider: &str,
        _config: &ProviderConfig,
        _url: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        self.downloads
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted download left")
    }
}

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

pub fn completed_response(result: &str) -> ProviderResponse {
    ProviderResponse {
        request_body: json!({"prompt": "test"}),
        raw_response: json!({"ok": true}),
        metrics: pixelforge_core::cost::UsageMetrics {
            unit_count: 1,
            ..Default::default()
        },
        outcome: ProviderOutcome::Completed {
            result: json!(result),
            thumbnail_url: None,
        },
    }
}

pub fn pending_response(operation_name: &str, duration_seconds: f64) -> ProviderResponse {
    ProviderResponse {
        request_body: json!({"instances": [{"prompt": "test"}]}),
        raw_response: json!({"name": operation_name}),
        metrics: pixelforge_core::cost::UsageMetrics {
            duration_seconds,
            unit_count: 1,
            ..Default::default()
        },
        outcome: ProviderOutcome::Pending {
            operation_name: operation_name.to_string(),
        },
    }
}

pub fn running_status() -> OperationStatus {
    OperationStatus {
        done: false,
        result_url: None,
        error: None,
        raw: json!({"done": false}),
    }
}

pub fn done_status(result_url: &str) -> OperationStatus {
    OperationStatus {
        done: true,
        result_url: Some(result_url.to_string()),
        error: None,
        raw: json!({"done": true}),
    }
}

pub fn failed_status(message: &str) -> OperationStatus {
    OperationStatus {
        done: true,
        result_url: None,
        error: Some(message.to_string()),
        raw: json!({"done": true, "error": {"message": message}}),
    }
}

/// A real `reqwest::Error`, built without touching the network.
pub fn http_error() -> ProviderError {
    let err = reqwest::Client::new()
        .get("http://")
        .build()
        .expect_err("an empty host must not parse");
    ProviderError::Http(err)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A fully wired engine stack over the fakes.
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub notifier: Arc<FakeNotifier>,
    pub gateway: Arc<FakeGateway>,
    pub generator: Arc<GenerationEngine>,
    pub workflow: Arc<WorkflowEngine>,
    pub poller: Arc<CompletionPoller>,
}

pub fn harness() -> Harness {
    let store = FakeStore::new();
    let notifier = Arc::new(FakeNotifier::default());
    let gateway = Arc::new(FakeGateway::default());
    let blobs = Arc::new(MemoryBlobStore::new());

    let generator = Arc::new(GenerationEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs.clone(),
        notifier.clone(),
        gateway.clone(),
    ));
    let workflow = Arc::new(WorkflowEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs.clone(),
        notifier.clone(),
        generator.clone(),
    ));
    let poller = Arc::new(CompletionPoller::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs,
        notifier.clone(),
        gateway.clone(),
    ));

    Harness {
        store,
        notifier,
        gateway,
        generator,
        workflow,
        poller,
    }
}

/// Fixed-price strategy: every generation costs exactly 10 credits.
pub fn fixed_cost_strategy() -> Value {
    json!({
        "calc_type": "fixed",
        "provider_unit_price_usd": 0.10,
        "markup_multiplier": 2.0,
        "credit_conversion_rate": 50.0,
        "min_credit_limit": 1
    })
}

/// Per-second strategy: 1 credit per second of requested video.
pub fn per_second_strategy() -> Value {
    json!({
        "calc_type": "per_second",
        "provider_unit_price_usd": 0.05,
        "markup_multiplier": 2.0,
        "credit_conversion_rate": 10.0,
        "min_credit_limit": 1
    })
}
