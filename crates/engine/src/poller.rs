//! Async completion poller for long-running generations.
//!
//! A poll task re-arms itself with a fixed delay while the provider still
//! reports the operation as running, bounded by [`MAX_POLLS`]. Terminal
//! provider failures refund the initiation charge (best-effort) before the
//! generation is marked failed. Infrastructure blips retry against a
//! separate, much smaller budget.

use std::sync::Arc;
use std::time::Duration;

use pixelforge_core::sanitize::sanitize_payload;
use pixelforge_core::types::DbId;
use pixelforge_db::models::credit::TransactionType;
use pixelforge_db::models::generation::Generation;
use pixelforge_db::models::status::GenerationStatus;
use pixelforge_db::store::{CreditLedger, GenerationStore, ModelCatalog, TaskQueue};
use pixelforge_events::{Notifier, PlatformEvent};
use pixelforge_providers::ProviderError;
use pixelforge_storage::{thumbnail, BlobStore};
use serde_json::json;

use crate::error::EngineError;
use crate::gateway::ProviderGateway;
use crate::generation::provider_config;
use crate::tasks::{self, PollPayload, ResumePayload};

/// Delay between "still processing" checks.
pub const POLL_DELAY: Duration = Duration::from_secs(30);

/// Business reschedule budget; past this the generation times out.
pub const MAX_POLLS: u32 = 40;

/// Consecutive infrastructure failures tolerated before giving up.
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 3;

/// Drives `processing` generations to a terminal state.
pub struct CompletionPoller {
    catalog: Arc<dyn ModelCatalog>,
    generations: Arc<dyn GenerationStore>,
    ledger: Arc<dyn CreditLedger>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    providers: Arc<dyn ProviderGateway>,
}

impl CompletionPoller {
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

    /// Handle one poll task. Idempotent: duplicate deliveries against an
    /// already-terminal generation are no-ops.
    pub async fn poll(&self, payload: &PollPayload) -> Result<(), EngineError> {
        let generation = self
            .generations
            .find(payload.generation_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "generation",
                id: payload.generation_id,
            })?;

        if matches!(
            GenerationStatus::from_id(generation.status_id),
            Some(s) if s.is_terminal()
        ) {
            tracing::debug!(
                generation_id = generation.id,
                "poll task for an already-terminal generation, skipping"
            );
            return Ok(());
        }

        let Some(operation_name) = generation.operation_name().map(str::to_string) else {
            return self
                .fail_generation(
                    &generation,
                    "processing generation carries no operation name",
                    payload.execution_id,
                )
                .await;
        };

        let link = self
            .catalog
            .link(generation.provider_link_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "provider link",
                id: generation.provider_link_id,
            })?;
        let schema = link.parse_schema()?;
        let config = provider_config(&link, &schema);

        let status = match self
            .providers
            .check_status(&link.provider, &config, &operation_name)
            .await
        {
            Ok(status) => status,
            Err(ProviderError::Http(e)) => {
                return self
                    .retry_transient(&generation, payload, &format!("status check failed: {e}"))
                    .await;
            }
            Err(e) => {
                return self
                    .fail_generation(&generation, &e.to_string(), payload.execution_id)
                    .await;
            }
        };

        if !status.done {
            if payload.poll_count + 1 >= MAX_POLLS {
                return self
                    .fail_generation(
                        &generation,
                        "timed out waiting for the provider to finish",
                        payload.execution_id,
                    )
                    .await;
            }
            return self
                .reschedule(PollPayload {
                    poll_count: payload.poll_count + 1,
                    transient_attempts: 0,
                    ..payload.clone()
                })
                .await;
        }

        if let Some(error) = status.error {
            return self
                .fail_generation(&generation, &error, payload.execution_id)
                .await;
        }

        let Some(result_url) = status.result_url else {
            // normalize_status guarantees done implies a result or an
            // error; guard anyway.
            return self
                .fail_generation(
                    &generation,
                    "operation finished without a result",
                    payload.execution_id,
                )
                .await;
        };

        let bytes = match self
            .providers
            .download(&link.provider, &config, &result_url)
            .await
        {
            Ok(bytes) => bytes,
            Err(ProviderError::Http(e)) => {
                return self
                    .retry_transient(
                        &generation,
                        payload,
                        &format!("result download failed: {e}"),
                    )
                    .await;
            }
            Err(e) => {
                return self
                    .fail_generation(&generation, &e.to_string(), payload.execution_id)
                    .await;
            }
        };

        let path = format!(
            "generations/{}/{}/result.{}",
            generation.user_id,
            generation.id,
            extension_for_url(&result_url)
        );
        let stored_url = match self.blobs.put(&path, &bytes).await {
            Ok(url) => url,
            Err(e) => {
                return self
                    .retry_transient(
                        &generation,
                        payload,
                        &format!("could not store the result: {e}"),
                    )
                    .await;
            }
        };

        // Video bytes will not decode as an image; that is expected.
        let thumbnail_url = match thumbnail::make_thumbnail(&bytes) {
            Ok(thumb) => {
                let thumb_path = thumbnail::thumbnail_path(generation.user_id, generation.id);
                match self.blobs.put(&thumb_path, &thumb).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(
                            generation_id = generation.id,
                            error = %e,
                            "could not store the thumbnail"
                        );
                        None
                    }
                }
            }
            Err(_) => None,
        };

        let mut output = generation
            .output_data
            .clone()
            .unwrap_or_else(|| json!({}));
        output["result"] = json!(stored_url);
        if let Some(thumb) = thumbnail_url {
            output["thumbnailUrl"] = json!(thumb);
        }
        output["raw"] = status.raw;

        let generation = self
            .generations
            .complete(generation.id, &sanitize_payload(&output), None)
            .await?;

        tracing::info!(generation_id = generation.id, "async generation completed");
        self.notifier
            .publish(
                PlatformEvent::new("generation.completed")
                    .with_source("generation", generation.id)
                    .with_payload(json!({"result": stored_url})),
                generation.user_id,
            )
            .await;

        self.resume_execution(payload.execution_id, generation.id)
            .await
    }

    /// Reschedule after an infrastructure blip, within the transient
    /// budget.
    async fn retry_transient(
        &self,
        generation: &Generation,
        payload: &PollPayload,
        reason: &str,
    ) -> Result<(), EngineError> {
        if payload.transient_attempts + 1 >= MAX_TRANSIENT_ATTEMPTS {
            return self
                .fail_generation(
                    generation,
                    &format!("giving up after repeated infrastructure failures: {reason}"),
                    payload.execution_id,
                )
                .await;
        }
        tracing::warn!(
            generation_id = generation.id,
            attempt = payload.transient_attempts + 1,
            reason,
            "transient poll failure, rescheduling"
        );
        self.reschedule(PollPayload {
            transient_attempts: payload.transient_attempts + 1,
            ..payload.clone()
        })
        .await
    }

    async fn reschedule(&self, payload: PollPayload) -> Result<(), EngineError> {
        self.queue
            .enqueue(
                tasks::GENERATION_POLL,
                serde_json::to_value(&payload)?,
                Some(POLL_DELAY),
            )
            .await?;
        Ok(())
    }

    /// Refund (best-effort), mark failed, notify, and resume any waiting
    /// execution.
    async fn fail_generation(
        &self,
        generation: &Generation,
        message: &str,
        execution_id: Option<DbId>,
    ) -> Result<(), EngineError> {
        if let Some(credits) = generation.user_credit_cost.filter(|c| *c > 0) {
            if let Err(e) = self
                .ledger
                .deposit(
                    generation.user_id,
                    credits,
                    TransactionType::Refund,
                    json!({"generation_id": generation.id, "reason": message}),
                )
                .await
            {
                // The refund must not block the failure from being
                // recorded; reconciliation happens over the ledger.
                tracing::error!(
                    generation_id = generation.id,
                    credits,
                    error = %e,
                    "refund failed"
                );
            }
        }

        let generation = self.generations.fail(generation.id, message, None).await?;
        tracing::warn!(generation_id = generation.id, message, "async generation failed");
        self.notifier
            .publish(
                PlatformEvent::new("generation.failed")
                    .with_source("generation", generation.id)
                    .with_payload(json!({"error": message})),
                generation.user_id,
            )
            .await;

        self.resume_execution(execution_id, generation.id).await
    }

    async fn resume_execution(
        &self,
        execution_id: Option<DbId>,
        generation_id: DbId,
    ) -> Result<(), EngineError> {
        let Some(execution_id) = execution_id else {
            return Ok(());
        };
        let payload = ResumePayload {
            execution_id,
            generation_id,
        };
        self.queue
            .enqueue(tasks::EXECUTION_RESUME, serde_json::to_value(&payload)?, None)
            .await?;
        Ok(())
    }
}

/// Extension of the downloaded result, from the URL path.
fn extension_for_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next() {
        Some(ext) if ext.len() <= 4 && !ext.contains('/') => ext,
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_extension_is_extracted() {
        assert_eq!(extension_for_url("gs://b/a/out.mp4"), "mp4");
        assert_eq!(extension_for_url("https://x/y.webm?sig=abc"), "webm");
        assert_eq!(extension_for_url("https://x/no-extension"), "mp4");
    }
}
