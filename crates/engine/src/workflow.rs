//! Multi-step app execution.
//!
//! An app is an ordered pipeline of steps, each producing one generation.
//! The engine resolves every step field from its configured source, gates
//! on approval where a step demands it, and chains steps by enqueueing the
//! next step task after each completion. A step failure ends the pipeline
//! cleanly; it never raises past this engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use pixelforge_core::json_path;
use pixelforge_core::fields::IMAGE_LIST_FIELD;
use pixelforge_core::template;
use pixelforge_core::types::DbId;
use pixelforge_db::models::app::{AppExecution, AppStep, CreateExecution, FieldSource};
use pixelforge_db::models::generation::Generation;
use pixelforge_db::models::status::{ExecutionStatus, GenerationStatus};
use pixelforge_db::store::{ExecutionStore, GenerationStore, ModelCatalog, TaskQueue};
use pixelforge_events::{Notifier, PlatformEvent};
use pixelforge_storage::BlobStore;
use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::generation::{GenerateRequest, GenerationEngine};
use crate::tasks::{self, StepPayload};

/// Drives app executions step by step.
pub struct WorkflowEngine {
    catalog: Arc<dyn ModelCatalog>,
    executions: Arc<dyn ExecutionStore>,
    generations: Arc<dyn GenerationStore>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    generator: Arc<GenerationEngine>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        executions: Arc<dyn ExecutionStore>,
        generations: Arc<dyn GenerationStore>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        generator: Arc<GenerationEngine>,
    ) -> Self {
        Self {
            catalog,
            executions,
            generations,
            queue,
            blobs,
            notifier,
            generator,
        }
    }

    /// Create a pending execution at step 1 and enqueue its first step.
    pub async fn start_app(
        &self,
        app_id: DbId,
        user_id: DbId,
        inputs: Map<String, Value>,
    ) -> Result<AppExecution, EngineError> {
        let app = self.catalog.app(app_id).await?.ok_or(EngineError::NotFound {
            entity: "app",
            id: app_id,
        })?;

        let execution = self
            .executions
            .create(&CreateExecution {
                app_id: app.id,
                user_id,
                inputs: Value::Object(inputs),
            })
            .await?;

        tracing::info!(execution_id = execution.id, app = %app.name, "app execution started");
        self.enqueue_step(execution.id, false).await?;
        self.notifier
            .publish(
                PlatformEvent::new("execution.started")
                    .with_source("app_execution", execution.id),
                execution.user_id,
            )
            .await;
        Ok(execution)
    }

    /// Run the step at `current_step`.
    ///
    /// Terminal executions are a no-op (duplicate task deliveries are
    /// expected). Running past the last step completes the execution. A
    /// step failure is recorded into history and fails the execution; it
    /// is never propagated to the caller.
    pub async fn execute_next_step(
        &self,
        execution_id: DbId,
        skip_approval: bool,
    ) -> Result<(), EngineError> {
        let execution = self
            .executions
            .find(execution_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "execution",
                id: execution_id,
            })?;
        let status = ExecutionStatus::from_id(execution.status_id);
        if matches!(status, Some(s) if s.is_terminal()) {
            tracing::debug!(execution_id, "step task for a terminal execution, skipping");
            return Ok(());
        }

        let step = self
            .catalog
            .step_at(execution.app_id, execution.current_step)
            .await?;
        let Some(step) = step else {
            // Past the last step: the pipeline is done.
            let execution = self
                .executions
                .set_status(execution_id, ExecutionStatus::Completed)
                .await?;
            self.notifier
                .publish(
                    PlatformEvent::new("execution.completed")
                        .with_source("app_execution", execution.id)
                        .with_payload(json!({"history": execution.history})),
                    execution.user_id,
                )
                .await;
            return Ok(());
        };

        if step.requires_approval && !skip_approval {
            self.executions
                .set_status(execution_id, ExecutionStatus::WaitingApproval)
                .await?;
            self.notifier
                .publish(
                    PlatformEvent::new("execution.waiting_approval")
                        .with_source("app_execution", execution.id)
                        .with_payload(json!({"step": step.step_order})),
                    execution.user_id,
                )
                .await;
            return Ok(());
        }

        if status != Some(ExecutionStatus::Processing) {
            self.executions
                .set_status(execution_id, ExecutionStatus::Processing)
                .await?;
        }

        if let Err(e) = self.run_step(&execution, &step).await {
            let message = e.to_string();
            tracing::warn!(
                execution_id,
                step = step.step_order,
                error = %message,
                "step failed, ending the pipeline"
            );
            if let Err(persist) = self
                .executions
                .record_step_result(
                    execution_id,
                    step.step_order,
                    &json!({"error": message}),
                    None,
                )
                .await
            {
                tracing::error!(execution_id, error = %persist, "could not record step failure");
            }
            self.executions.mark_failed(execution_id, &message).await?;
            self.notifier
                .publish(
                    PlatformEvent::new("execution.failed")
                        .with_source("app_execution", execution_id)
                        .with_payload(json!({"step": step.step_order, "error": message})),
                    execution.user_id,
                )
                .await;
        }
        Ok(())
    }

    /// Record a completed generation into history, advance the cursor, and
    /// enqueue the next step (which re-evaluates approval gating).
    pub async fn handle_step_completion(
        &self,
        execution_id: DbId,
        generation: &Generation,
    ) -> Result<(), EngineError> {
        let execution = self
            .executions
            .find(execution_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "execution",
                id: execution_id,
            })?;
        if matches!(
            ExecutionStatus::from_id(execution.status_id),
            Some(s) if s.is_terminal()
        ) {
            return Ok(());
        }

        let output = generation.output_data.clone().unwrap_or(Value::Null);
        self.executions
            .record_step_result(
                execution_id,
                execution.current_step,
                &output,
                Some(generation.id),
            )
            .await?;
        self.executions.advance_step(execution_id).await?;
        self.enqueue_step(execution_id, false).await
    }

    /// Release an execution paused at an approval gate.
    ///
    /// Only valid from `waiting_approval`; the gated step runs with the
    /// gate lifted exactly once.
    pub async fn approve_step(&self, execution_id: DbId) -> Result<AppExecution, EngineError> {
        let execution = self
            .executions
            .find(execution_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "execution",
                id: execution_id,
            })?;
        if ExecutionStatus::from_id(execution.status_id) != Some(ExecutionStatus::WaitingApproval)
        {
            return Err(EngineError::InvalidState(format!(
                "execution {execution_id} is not waiting for approval"
            )));
        }

        let execution = self
            .executions
            .set_status(execution_id, ExecutionStatus::Processing)
            .await?;
        self.enqueue_step(execution_id, true).await?;
        Ok(execution)
    }

    /// Continue an execution after one of its generations reached a
    /// terminal state asynchronously.
    pub async fn resume_from_generation(
        &self,
        execution_id: DbId,
        generation_id: DbId,
    ) -> Result<(), EngineError> {
        let generation = self
            .generations
            .find(generation_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "generation",
                id: generation_id,
            })?;
        let execution = self
            .executions
            .find(execution_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "execution",
                id: execution_id,
            })?;
        if matches!(
            ExecutionStatus::from_id(execution.status_id),
            Some(s) if s.is_terminal()
        ) {
            return Ok(());
        }

        match GenerationStatus::from_id(generation.status_id) {
            Some(GenerationStatus::Completed) => {
                self.handle_step_completion(execution_id, &generation).await
            }
            Some(GenerationStatus::Failed) => {
                let message = generation
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "generation failed".to_string());
                self.executions
                    .record_step_result(
                        execution_id,
                        execution.current_step,
                        &json!({"error": message}),
                        Some(generation.id),
                    )
                    .await?;
                self.executions.mark_failed(execution_id, &message).await?;
                self.notifier
                    .publish(
                        PlatformEvent::new("execution.failed")
                            .with_source("app_execution", execution_id)
                            .with_payload(
                                json!({"step": execution.current_step, "error": message}),
                            ),
                        execution.user_id,
                    )
                    .await;
                Ok(())
            }
            _ => {
                tracing::warn!(
                    execution_id,
                    generation_id,
                    "resume for a non-terminal generation, skipping"
                );
                Ok(())
            }
        }
    }

    // ---- Step execution ----

    async fn run_step(
        &self,
        execution: &AppExecution,
        step: &AppStep,
    ) -> Result<(), EngineError> {
        let fields = self.resolve_fields(execution, step).await?;

        // Provenance: the previous step's generation, when there is one.
        let parent_generation_id = execution
            .generation_ids
            .get((execution.current_step - 1).to_string())
            .and_then(Value::as_i64);

        let generation = self
            .generator
            .generate(GenerateRequest {
                user_id: execution.user_id,
                model_id: step.model_id,
                input_data: fields,
                parent_generation_id,
                execution_id: Some(execution.id),
                retry_of: None,
            })
            .await?;

        match GenerationStatus::from_id(generation.status_id) {
            Some(GenerationStatus::Completed) => {
                self.handle_step_completion(execution.id, &generation).await
            }
            Some(GenerationStatus::Processing) => {
                // The poller resumes this execution; just pin the
                // generation to the step so the run is observable.
                self.executions
                    .record_step_result(
                        execution.id,
                        execution.current_step,
                        &Value::Null,
                        Some(generation.id),
                    )
                    .await?;
                Ok(())
            }
            other => Err(EngineError::InvalidState(format!(
                "generation {} returned in unexpected state {other:?}",
                generation.id
            ))),
        }
    }

    /// Resolve every configured field by its source, then derive the image
    /// list, the per-field image indices, and the step prompt.
    async fn resolve_fields(
        &self,
        execution: &AppExecution,
        step: &AppStep,
    ) -> Result<Map<String, Value>, EngineError> {
        let config = step.parse_config()?;
        let empty = Map::new();
        let inputs = execution.inputs.as_object().unwrap_or(&empty);

        let mut resolved = Map::new();
        for (field, source) in &config {
            let value = match source {
                FieldSource::Static { value } => template::decode_stringified(value),
                FieldSource::User { key, default } => {
                    let key = key.as_deref().unwrap_or(field);
                    match inputs.get(key) {
                        Some(v) if !v.is_null() => v.clone(),
                        _ => default.clone().unwrap_or(Value::Null),
                    }
                }
                FieldSource::Previous { step: origin, output_key } => {
                    let found = execution
                        .history_entry(*origin)
                        .and_then(|h| json_path::lookup(h, output_key));
                    match found {
                        Some(v) => v.clone(),
                        None => {
                            // A gap the user can observe, not a hard stop.
                            tracing::warn!(
                                execution_id = execution.id,
                                step = origin,
                                output_key = %output_key,
                                "previous step output missing, resolving to null"
                            );
                            Value::Null
                        }
                    }
                }
                FieldSource::MergeArrays { default, user_keys } => {
                    merge_arrays(default, user_keys, inputs)
                }
                FieldSource::Template { template } => {
                    Value::String(render_text(template, inputs))
                }
            };
            resolved.insert(field.clone(), value);
        }

        for value in resolved.values_mut() {
            self.resolve_file_refs(value).await?;
        }

        let (image_list, index_map) = assign_image_indices(&config, &resolved);
        if !step.prompt_template.is_empty() {
            let prompt = render_prompt(&step.prompt_template, &resolved, &index_map);
            resolved.insert("prompt".to_string(), Value::String(prompt));
        }
        if !image_list.is_empty() {
            resolved.insert(IMAGE_LIST_FIELD.to_string(), Value::Array(image_list));
        }
        Ok(resolved)
    }

    /// Replace private blob keys with durable URLs, inlining the bytes as
    /// a data URI when the store cannot produce a fetchable one. An
    /// unreachable local URL must never leak to an external provider.
    async fn resolve_file_refs(&self, value: &mut Value) -> Result<(), EngineError> {
        match value {
            Value::String(s) => {
                if let Some(resolved) = self.durable_url(s).await? {
                    *s = resolved;
                }
            }
            Value::Array(items) => {
                for item in items {
                    Box::pin(self.resolve_file_refs(item)).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn durable_url(&self, value: &str) -> Result<Option<String>, EngineError> {
        // Anything with a scheme is already resolved (or plain text).
        if value.contains("://") || value.starts_with("data:") || !value.contains('/') {
            return Ok(None);
        }
        match self.blobs.exists(value).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                tracing::warn!(key = value, error = %e, "blob existence check failed");
                return Ok(None);
            }
        }

        let url = self.blobs.url_for(value);
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("gs://") {
            return Ok(Some(url));
        }

        let bytes = self.blobs.get(value).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(Some(format!("data:{};base64,{encoded}", mime_for_path(value))))
    }

    async fn enqueue_step(&self, execution_id: DbId, skip_approval: bool) -> Result<(), EngineError> {
        let payload = StepPayload {
            execution_id,
            skip_approval,
        };
        self.queue
            .enqueue(tasks::EXECUTION_STEP, serde_json::to_value(&payload)?, None)
            .await?;
        Ok(())
    }
}

// ---- Field resolution helpers ----

/// Concatenate a static default plus named user-input arrays into one flat
/// array, dropping null and empty-string entries.
fn merge_arrays(
    default: &[Value],
    user_keys: &[String],
    inputs: &Map<String, Value>,
) -> Value {
    let mut out = Vec::new();
    for value in default {
        flatten_into(value, &mut out);
    }
    for key in user_keys {
        if let Some(value) = inputs.get(key) {
            flatten_into(value, &mut out);
        }
    }
    Value::Array(out)
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Null => {}
        Value::String(s) if s.is_empty() => {}
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Assign stable 1-based indices to every image reference, static-sourced
/// fields first, then everything else; config (field-name) order within
/// each group. Returns the flat ordered image list and the per-field
/// indices.
fn assign_image_indices(
    config: &BTreeMap<String, FieldSource>,
    resolved: &Map<String, Value>,
) -> (Vec<Value>, BTreeMap<String, Vec<usize>>) {
    let mut image_list = Vec::new();
    let mut index_map = BTreeMap::new();

    for pass in 0..=1u8 {
        for (field, source) in config {
            if source_priority(source) != pass {
                continue;
            }
            let Some(value) = resolved.get(field) else {
                continue;
            };
            let mut indices = Vec::new();
            collect_image_refs(value, &mut |url| {
                image_list.push(Value::String(url.to_string()));
                indices.push(image_list.len());
            });
            if !indices.is_empty() {
                index_map.insert(field.clone(), indices);
            }
        }
    }
    (image_list, index_map)
}

fn source_priority(source: &FieldSource) -> u8 {
    match source {
        FieldSource::Static { .. } => 0,
        _ => 1,
    }
}

fn collect_image_refs(value: &Value, push: &mut dyn FnMut(&str)) {
    match value {
        Value::String(s) if template::media_from_str(s).is_some() => push(s),
        Value::Array(items) => {
            for item in items {
                collect_image_refs(item, push);
            }
        }
        _ => {}
    }
}

/// Substitute `{field}` tokens: image fields become `[image_N]` /
/// `[image_N, image_M]` references, everything else its string form.
fn render_prompt(
    template: &str,
    resolved: &Map<String, Value>,
    index_map: &BTreeMap<String, Vec<usize>>,
) -> String {
    let mut out = template.to_string();
    for (field, value) in resolved {
        let token = format!("{{{field}}}");
        if !out.contains(&token) {
            continue;
        }
        let replacement = match index_map.get(field) {
            Some(indices) => image_reference(indices),
            None => stringify_field(value),
        };
        out = out.replace(&token, &replacement);
    }
    out
}

/// Substitute `{field}` tokens against the execution inputs, stringified.
fn render_text(template: &str, inputs: &Map<String, Value>) -> String {
    let mut out = template.to_string();
    for (key, value) in inputs {
        out = out.replace(&format!("{{{key}}}"), &stringify_field(value));
    }
    out
}

fn image_reference(indices: &[usize]) -> String {
    let list = indices
        .iter()
        .map(|i| format!("image_{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{list}]")
}

fn stringify_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn mime_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
