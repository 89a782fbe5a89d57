//! The generation engine: one provider invocation, end to end.
//!
//! Normalizes inputs against the provider schema, calls the provider,
//! bills the user, and persists the outcome. Billing policy: credits are
//! only ever debited after a confirmed successful provider call; async
//! flows are charged at initiation so a later completion pass can never
//! double-charge.

use std::sync::Arc;

use base64::Engine as _;
use pixelforge_core::cost;
use pixelforge_core::fields::{apply_field_mapping, coerce_value, FieldType};
use pixelforge_core::sanitize::sanitize_payload;
use pixelforge_core::template::{self, MediaContent};
use pixelforge_core::types::DbId;
use pixelforge_db::models::credit::TransactionType;
use pixelforge_db::models::generation::{CreateGeneration, Generation, GenerationCost};
use pixelforge_db::models::model::{InteractionMethod, ModelProviderLink, ProviderSchema};
use pixelforge_db::store::{CreditLedger, GenerationStore, ModelCatalog, TaskQueue};
use pixelforge_events::{Notifier, PlatformEvent};
use pixelforge_providers::adapter::{GenerationContext, ProviderConfig, ProviderOutcome};
use pixelforge_providers::{ProviderError, ProviderKind};
use pixelforge_storage::BlobStore;
use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::gateway::ProviderGateway;
use crate::poller::POLL_DELAY;
use crate::tasks::{self, PollPayload};

/// One generation request, as assembled by a caller or the workflow
/// engine.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub user_id: DbId,
    pub model_id: DbId,
    /// Raw input field map, pre-coercion.
    pub input_data: Map<String, Value>,
    /// Provenance link, e.g. a video generated from an image generation.
    pub parent_generation_id: Option<DbId>,
    /// Execution to resume once an async generation reaches a terminal
    /// state.
    pub execution_id: Option<DbId>,
    /// Failed generation to reuse for this attempt instead of inserting a
    /// new row.
    pub retry_of: Option<DbId>,
}

/// Drives single generations against the configured provider.
pub struct GenerationEngine {
    catalog: Arc<dyn ModelCatalog>,
    generations: Arc<dyn GenerationStore>,
    ledger: Arc<dyn CreditLedger>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    providers: Arc<dyn ProviderGateway>,
}

impl GenerationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        generations: Arc<dyn GenerationStore>,
        ledger: Arc<dyn CreditLedger>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        providers: Arc<dyn ProviderGateway>,
    ) -> Self {
        Self {
            catalog,
            generations,
            ledger,
            queue,
            blobs,
            notifier,
            providers,
        }
    }

    /// Run one generation to its first persistent state: `completed` for
    /// synchronous providers, `processing` (with a poll task enqueued) for
    /// long-running ones, `failed` on any provider error.
    pub async fn generate(&self, request: GenerateRequest) -> Result<Generation, EngineError> {
        let model = self
            .catalog
            .model(request.model_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "model",
                id: request.model_id,
            })?;
        let link = self
            .catalog
            .primary_link(model.id)
            .await?
            .ok_or_else(|| {
                EngineError::Configuration(format!("no active provider for model '{}'", model.name))
            })?;
        let schema = link.parse_schema()?;

        let kind = ProviderKind::parse(&link.provider).ok_or_else(|| {
            EngineError::Configuration(format!("unknown provider '{}'", link.provider))
        })?;
        if schema.interaction_method == InteractionMethod::LongRunning && !kind.is_long_running() {
            return Err(EngineError::Configuration(format!(
                "provider '{}' cannot run in long-running mode",
                link.provider
            )));
        }
        let strategy = link.parse_cost_strategy()?;

        let normalized = self
            .normalize_inputs(&schema, request.input_data, request.user_id)
            .await?;
        let fields = apply_field_mapping(normalized, &schema.field_mapping);

        let create = CreateGeneration {
            user_id: request.user_id,
            model_id: model.id,
            provider_link_id: link.id,
            input_data: sanitize_payload(&Value::Object(fields.clone())),
            parent_generation_id: request.parent_generation_id,
        };
        let generation = match request.retry_of {
            Some(id) => self.generations.reset_for_retry(id, &create).await?,
            None => self.generations.create(&create).await?,
        };

        tracing::info!(
            generation_id = generation.id,
            model = %model.name,
            provider = %link.provider,
            "generation started"
        );

        // A known-ahead price is checked against the balance before the
        // provider is invoked; usage-priced strategies settle afterward.
        if let Some(credits) = cost::upfront_credits(strategy.as_ref()) {
            if credits > 0 {
                let balance = self.ledger.balance(request.user_id).await?;
                if balance < credits {
                    let err = EngineError::InsufficientCredits {
                        balance,
                        requested: credits,
                    };
                    if let Err(persist) = self
                        .generations
                        .fail(generation.id, &err.to_string(), None)
                        .await
                    {
                        tracing::error!(
                            generation_id = generation.id,
                            error = %persist,
                            "could not persist generation failure"
                        );
                    }
                    self.notify_failed(&generation, &err.to_string()).await;
                    return Err(err);
                }
            }
        }

        let config = provider_config(&link, &schema);
        let ctx = GenerationContext {
            user_id: request.user_id,
            generation_id: generation.id,
        };

        let response = match self
            .providers
            .generate(&link.provider, &config, &fields, ctx)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // A failed call never touches the ledger.
                let output = failure_output(&e);
                if let Err(persist) = self
                    .generations
                    .fail(generation.id, &e.to_string(), output.as_ref())
                    .await
                {
                    tracing::error!(
                        generation_id = generation.id,
                        error = %persist,
                        "could not persist generation failure"
                    );
                }
                self.notify_failed(&generation, &e.to_string()).await;
                return Err(e.into());
            }
        };

        self.generations
            .set_request_body(generation.id, &response.request_body)
            .await?;

        let breakdown = cost::calculate(strategy.as_ref(), &response.metrics);
        let generation_cost = GenerationCost {
            provider_cost_usd: breakdown.provider_cost_usd,
            user_credit_cost: breakdown.credits,
            profit_usd: breakdown.profit_usd,
        };

        match response.outcome {
            ProviderOutcome::Pending { operation_name } => {
                // Charged at initiation: the call succeeded and the cost is
                // known, so a later completion pass never re-bills.
                self.charge(&generation, breakdown.credits).await?;

                let output = json!({"operationName": operation_name});
                let generation = self
                    .generations
                    .mark_processing(generation.id, &output, &generation_cost)
                    .await?;

                let payload = PollPayload {
                    generation_id: generation.id,
                    execution_id: request.execution_id,
                    poll_count: 0,
                    transient_attempts: 0,
                };
                self.queue
                    .enqueue(
                        tasks::GENERATION_POLL,
                        serde_json::to_value(&payload)?,
                        Some(POLL_DELAY),
                    )
                    .await?;

                self.notifier
                    .publish(
                        PlatformEvent::new("generation.processing")
                            .with_source("generation", generation.id),
                        generation.user_id,
                    )
                    .await;
                Ok(generation)
            }
            ProviderOutcome::Completed {
                result,
                thumbnail_url,
            } => {
                self.charge(&generation, breakdown.credits).await?;

                let mut output = json!({
                    "result": result,
                    "raw": response.raw_response,
                });
                if let Some(thumb) = thumbnail_url {
                    output["thumbnailUrl"] = Value::String(thumb);
                }
                let output = sanitize_payload(&output);
                let generation = self
                    .generations
                    .complete(generation.id, &output, Some(&generation_cost))
                    .await?;

                self.notifier
                    .publish(
                        PlatformEvent::new("generation.completed")
                            .with_source("generation", generation.id)
                            .with_payload(json!({"result": output["result"]})),
                        generation.user_id,
                    )
                    .await;
                Ok(generation)
            }
        }
    }

    /// Coerce each input field by its declared type; file-typed inline
    /// payloads are uploaded and replaced by their storage URLs.
    async fn normalize_inputs(
        &self,
        schema: &ProviderSchema,
        input: Map<String, Value>,
        user_id: DbId,
    ) -> Result<Map<String, Value>, EngineError> {
        let mut out = Map::with_capacity(input.len());
        for (name, value) in input {
            let declared = schema
                .field_types
                .get(&name)
                .and_then(Value::as_str)
                .map(FieldType::parse)
                .unwrap_or(FieldType::Text);
            let value = if declared == FieldType::File {
                self.upload_value(user_id, value).await?
            } else {
                coerce_value(declared, value)
            };
            out.insert(name, value);
        }
        Ok(out)
    }

    async fn upload_value(&self, user_id: DbId, value: Value) -> Result<Value, EngineError> {
        match value {
            Value::String(s) => Ok(Value::String(self.upload_one(user_id, s).await?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Box::pin(self.upload_value(user_id, item)).await?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other),
        }
    }

    /// Upload a single inline file value; URLs and non-media strings pass
    /// through unchanged.
    async fn upload_one(&self, user_id: DbId, value: String) -> Result<String, EngineError> {
        let Some(media) = template::media_from_str(&value) else {
            return Ok(value);
        };
        let MediaContent::Inline(data) = media.content else {
            return Ok(value);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| EngineError::Validation(format!("file field is not valid base64: {e}")))?;
        let path = format!(
            "uploads/{user_id}/{}.{}",
            uuid::Uuid::new_v4(),
            extension_for_mime(&media.mime_type)
        );
        Ok(self.blobs.put(&path, &bytes).await?)
    }

    /// Debit the user after a confirmed successful call. A rejected charge
    /// fails the generation.
    async fn charge(&self, generation: &Generation, credits: i64) -> Result<(), EngineError> {
        if credits <= 0 {
            return Ok(());
        }
        match self
            .ledger
            .withdraw(
                generation.user_id,
                credits,
                TransactionType::Usage,
                json!({"generation_id": generation.id}),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err: EngineError = e.into();
                if let Err(persist) = self
                    .generations
                    .fail(generation.id, &err.to_string(), None)
                    .await
                {
                    tracing::error!(
                        generation_id = generation.id,
                        error = %persist,
                        "could not persist generation failure"
                    );
                }
                self.notify_failed(generation, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn notify_failed(&self, generation: &Generation, message: &str) {
        self.notifier
            .publish(
                PlatformEvent::new("generation.failed")
                    .with_source("generation", generation.id)
                    .with_payload(json!({"error": message})),
                generation.user_id,
            )
            .await;
    }
}

/// Assemble the adapter configuration for a provider link.
pub(crate) fn provider_config(
    link: &ModelProviderLink,
    schema: &ProviderSchema,
) -> ProviderConfig {
    ProviderConfig {
        provider_model_id: link.provider_model_id.clone(),
        api_key_env: link.api_key_env.clone(),
        base_url: link.base_url.clone(),
        request_template: schema.request_template.clone(),
        response_path: schema.response_path.clone(),
    }
}

/// Diagnostic output persisted with a failed generation, when the error
/// carries the exchange.
fn failure_output(error: &ProviderError) -> Option<Value> {
    match error {
        ProviderError::Request {
            status,
            request_body,
            response_body,
        } => Some(json!({
            "status": status,
            "requestBody": request_body,
            "responseBody": sanitize_payload(&Value::String(response_body.clone())),
        })),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}
