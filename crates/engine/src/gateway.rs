//! Seam between the engines and the provider adapters.
//!
//! The engines call providers through this trait so tests can script
//! provider behavior without a network. The production implementation
//! builds a [`ProviderAdapter`] per call.

use std::sync::Arc;

use pixelforge_providers::adapter::{
    GenerationContext, OperationStatus, ProviderAdapter, ProviderConfig, ProviderResponse,
};
use pixelforge_providers::ProviderError;
use pixelforge_storage::BlobStore;
use serde_json::{Map, Value};

/// Provider invocation collaborator.
#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn generate(
        &self,
        provider: &str,
        config: &ProviderConfig,
        fields: &Map<String, Value>,
        ctx: GenerationContext,
    ) -> Result<ProviderResponse, ProviderError>;

    async fn check_status(
        &self,
        provider: &str,
        config: &ProviderConfig,
        operation_name: &str,
    ) -> Result<OperationStatus, ProviderError>;

    async fn download(
        &self,
        provider: &str,
        config: &ProviderConfig,
        url: &str,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// The real gateway: one adapter per call over a shared blob store.
pub struct AdapterGateway {
    blobs: Arc<dyn BlobStore>,
}

impl AdapterGateway {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }
}

#[async_trait::async_trait]
impl ProviderGateway for AdapterGateway {
    async fn generate(
        &self,
        provider: &str,
        config: &ProviderConfig,
        fields: &Map<String, Value>,
        ctx: GenerationContext,
    ) -> Result<ProviderResponse, ProviderError> {
        ProviderAdapter::new(provider, self.blobs.clone())?
            .generate(config, fields, ctx)
            .await
    }

    async fn check_status(
        &self,
        provider: &str,
        config: &ProviderConfig,
        operation_name: &str,
    ) -> Result<OperationStatus, ProviderError> {
        ProviderAdapter::new(provider, self.blobs.clone())?
            .check_status(config, operation_name)
            .await
    }

    async fn download(
        &self,
        provider: &str,
        config: &ProviderConfig,
        url: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        ProviderAdapter::new(provider, self.blobs.clone())?
            .download(config, url)
            .await
    }
}
