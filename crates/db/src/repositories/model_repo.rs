//! Repository for `ai_models` and `model_provider_links`.

use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::model::{AiModel, ModelProviderLink};

/// Column list for `ai_models` queries.
const MODEL_COLUMNS: &str = "id, name, modality, created_at";

/// Column list for `model_provider_links` queries.
const LINK_COLUMNS: &str = "\
    id, model_id, provider, provider_model_id, is_primary, \
    api_key_env, base_url, cost_strategy, schema, created_at";

/// Lookup operations for models and their provider links.
pub struct ModelRepo;

impl ModelRepo {
    /// Find a model by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AiModel>, StoreError> {
        let query = format!("SELECT {MODEL_COLUMNS} FROM ai_models WHERE id = $1");
        Ok(sqlx::query_as::<_, AiModel>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// The primary provider link for a model, when one is configured.
    ///
    /// A model may have many links, but the core always dispatches through
    /// the primary one.
    pub async fn primary_link(
        pool: &PgPool,
        model_id: DbId,
    ) -> Result<Option<ModelProviderLink>, StoreError> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM model_provider_links \
             WHERE model_id = $1 AND is_primary \
             LIMIT 1"
        );
        Ok(sqlx::query_as::<_, ModelProviderLink>(&query)
            .bind(model_id)
            .fetch_optional(pool)
            .await?)
    }

    /// Find a provider link by its ID.
    pub async fn find_link_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ModelProviderLink>, StoreError> {
        let query = format!("SELECT {LINK_COLUMNS} FROM model_provider_links WHERE id = $1");
        Ok(sqlx::query_as::<_, ModelProviderLink>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }
}
