//! The closed provider set and its dispatch surface.

use std::sync::Arc;

use pixelforge_core::cost::UsageMetrics;
use pixelforge_core::types::DbId;
use pixelforge_storage::BlobStore;
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::{gemini, http, templated, vertex};

/// Discriminates the supported upstream providers.
///
/// Stored in `model_provider_links.provider`; anything outside this set is
/// a configuration error at adapter construction, not at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Generic schema-driven HTTP provider: render `request_template`,
    /// POST it, extract the result via `response_path`.
    TemplatedHttp,
    /// Synchronous image vendor with a `contents`/`parts` request shape
    /// and inline-base64 responses.
    GeminiImage,
    /// Long-running video vendor: initiation returns an operation name
    /// that is polled until done.
    VertexVideo,
}

impl ProviderKind {
    /// Parse the stored discriminator string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "templated_http" => Some(Self::TemplatedHttp),
            "gemini_image" => Some(Self::GeminiImage),
            "vertex_video" => Some(Self::VertexVideo),
            _ => None,
        }
    }

    /// Whether this provider completes asynchronously via status polling.
    pub fn is_long_running(self) -> bool {
        matches!(self, Self::VertexVideo)
    }
}

/// Per-link provider configuration, resolved by the caller from the model
/// catalog.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// The provider's own identifier for the model.
    pub provider_model_id: String,
    /// Environment variable holding this link's API credential.
    pub api_key_env: Option<String>,
    /// Endpoint override; each variant has its own default where one makes
    /// sense.
    pub base_url: Option<String>,
    /// Nested JSON with `{{field}}` tokens. `Null` when unconfigured.
    pub request_template: Value,
    /// Dot-path into the raw response for synchronous extraction.
    pub response_path: Option<String>,
}

/// Where result blobs for one call are stored.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext {
    pub user_id: DbId,
    pub generation_id: DbId,
}

impl GenerationContext {
    /// Blob key for the `index`-th result of this generation.
    pub(crate) fn result_path(&self, index: usize, extension: &str) -> String {
        format!(
            "generations/{}/{}/result_{index}.{extension}",
            self.user_id, self.generation_id
        )
    }
}

/// What one `generate` call produced.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Sanitized copy of the body that was actually sent.
    pub request_body: Value,
    /// Sanitized raw response, for persistence and diagnosis.
    pub raw_response: Value,
    /// Usage reported by (or measured around) the call.
    pub metrics: UsageMetrics,
    pub outcome: ProviderOutcome,
}

/// Terminal-or-pending result of an initiation call.
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    /// The response already carries the result: a storage/provider URL, or
    /// an array of them.
    Completed {
        result: Value,
        thumbnail_url: Option<String>,
    },
    /// Long-running: only an operation name to poll came back.
    Pending { operation_name: String },
}

/// Normalized status of a long-running operation.
///
/// Provider-specific done/error/result shapes are folded into this triple;
/// a terminal state without a result is reported as `error`, never as a
/// silent empty success.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub done: bool,
    pub result_url: Option<String>,
    pub error: Option<String>,
    /// Sanitized raw poll response.
    pub raw: Value,
}

/// One configured provider adapter.
///
/// Holds the shared HTTP client and the blob store that inline results are
/// uploaded to. Cheap to construct per call.
pub struct ProviderAdapter {
    pub(crate) kind: ProviderKind,
    pub(crate) client: reqwest::Client,
    pub(crate) blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl ProviderAdapter {
    /// Build an adapter for a stored provider discriminator.
    pub fn new(provider: &str, blobs: Arc<dyn BlobStore>) -> Result<Self, ProviderError> {
        let kind = ProviderKind::parse(provider).ok_or_else(|| {
            ProviderError::Configuration(format!("unknown provider '{provider}'"))
        })?;
        Ok(Self {
            kind,
            client: http::build_client()?,
            blobs,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Issue one generation call.
    ///
    /// `fields` must already be type-coerced and field-mapped. Synchronous
    /// variants return [`ProviderOutcome::Completed`]; long-running
    /// variants return [`ProviderOutcome::Pending`].
    pub async fn generate(
        &self,
        config: &ProviderConfig,
        fields: &Map<String, Value>,
        ctx: GenerationContext,
    ) -> Result<ProviderResponse, ProviderError> {
        match self.kind {
            ProviderKind::TemplatedHttp => templated::generate(self, config, fields, ctx).await,
            ProviderKind::GeminiImage => gemini::generate(self, config, fields, ctx).await,
            ProviderKind::VertexVideo => vertex::generate(self, config, fields).await,
        }
    }

    /// Poll a long-running operation.
    pub async fn check_status(
        &self,
        config: &ProviderConfig,
        operation_name: &str,
    ) -> Result<OperationStatus, ProviderError> {
        match self.kind {
            ProviderKind::VertexVideo => {
                vertex::check_status(self, config, operation_name).await
            }
            ProviderKind::TemplatedHttp | ProviderKind::GeminiImage => {
                Err(ProviderError::Configuration(format!(
                    "provider '{:?}' does not support status polling",
                    self.kind
                )))
            }
        }
    }

    /// Download the bytes of a completed long-running result.
    pub async fn download(
        &self,
        config: &ProviderConfig,
        url: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        match self.kind {
            ProviderKind::VertexVideo => vertex::download(self, config, url).await,
            ProviderKind::TemplatedHttp | ProviderKind::GeminiImage => {
                Err(ProviderError::Configuration(format!(
                    "provider '{:?}' does not support result download",
                    self.kind
                )))
            }
        }
    }
}
