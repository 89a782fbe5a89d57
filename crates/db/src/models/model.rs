//! AI model and provider-link models.
//!
//! A logical model (`ai_models`) binds to one or more upstream providers
//! via `model_provider_links`; the core always selects the primary link.
//! The link's `schema` JSONB column parses into [`ProviderSchema`], its
//! `cost_strategy` column into [`pixelforge_core::cost::CostStrategy`].

use pixelforge_core::cost::CostStrategy;
use pixelforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::error::StoreError;

/// A row from the `ai_models` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiModel {
    pub id: DbId,
    pub name: String,
    /// What the model produces, e.g. `"image"` or `"video"`.
    pub modality: String,
    pub created_at: Timestamp,
}

/// How a provider returns results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMethod {
    /// The initiation response already carries the result.
    #[default]
    Synchronous,
    /// The initiation response carries an operation name to poll.
    LongRunning,
}

/// Typed form of a link's `schema` JSONB column.
///
/// Immutable at generation time; only configuration tooling writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSchema {
    /// Nested JSON with `{{field}}` tokens.
    #[serde(default)]
    pub request_template: Value,
    /// Dot-path into the provider's raw JSON response.
    #[serde(default)]
    pub response_path: Option<String>,
    /// Standard-field to provider-field renames.
    #[serde(default)]
    pub field_mapping: Map<String, Value>,
    /// Declared input field types, keyed by standard field name.
    #[serde(default)]
    pub field_types: Map<String, Value>,
    #[serde(default)]
    pub interaction_method: InteractionMethod,
}

/// A row from the `model_provider_links` table.
#[derive(Debug, Clone, FromRow)]
pub struct ModelProviderLink {
    pub id: DbId,
    pub model_id: DbId,
    /// Adapter discriminator: `templated_http`, `gemini_image`, or
    /// `vertex_video`.
    pub provider: String,
    /// The provider's own identifier for this model.
    pub provider_model_id: String,
    pub is_primary: bool,
    /// Environment variable holding this link's API credential.
    pub api_key_env: Option<String>,
    /// Base URL override for the provider endpoint.
    pub base_url: Option<String>,
    /// Raw `cost_strategy` JSONB column.
    pub cost_strategy: Option<Value>,
    /// Raw `schema` JSONB column.
    pub schema: Value,
    pub created_at: Timestamp,
}

impl ModelProviderLink {
    /// Parse the `schema` column into its typed form.
    pub fn parse_schema(&self) -> Result<ProviderSchema, StoreError> {
        Ok(serde_json::from_value(self.schema.clone())?)
    }

    /// Parse the `cost_strategy` column, `None` when unconfigured.
    pub fn parse_cost_strategy(&self) -> Result<Option<CostStrategy>, StoreError> {
        match &self.cost_strategy {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(schema: Value, cost_strategy: Option<Value>) -> ModelProviderLink {
        ModelProviderLink {
            id: 1,
            model_id: 1,
            provider: "templated_http".into(),
            provider_model_id: "sdxl-v1".into(),
            is_primary: true,
            api_key_env: None,
            base_url: None,
            cost_strategy,
            schema,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn schema_parses_with_defaults() {
        let parsed = link(json!({"request_template": {"prompt": "{{p}}"}}), None)
            .parse_schema()
            .unwrap();
        assert_eq!(parsed.request_template, json!({"prompt": "{{p}}"}));
        assert_eq!(parsed.interaction_method, InteractionMethod::Synchronous);
        assert!(parsed.response_path.is_none());
        assert!(parsed.field_mapping.is_empty());
    }

    #[test]
    fn long_running_interaction_parses() {
        let parsed = link(
            json!({"request_template": {}, "interaction_method": "long_running"}),
            None,
        )
        .parse_schema()
        .unwrap();
        assert_eq!(parsed.interaction_method, InteractionMethod::LongRunning);
    }

    #[test]
    fn missing_cost_strategy_is_none() {
        assert!(link(json!({}), None).parse_cost_strategy().unwrap().is_none());
        assert!(link(json!({}), Some(Value::Null))
            .parse_cost_strategy()
            .unwrap()
            .is_none());
    }

    #[test]
    fn cost_strategy_parses() {
        let strategy = link(
            json!({}),
            Some(json!({
                "calc_type": "per_second",
                "provider_unit_price_usd": 0.02,
                "markup_multiplier": 2.0,
                "credit_conversion_rate": 100.0,
                "min_credit_limit": 1
            })),
        )
        .parse_cost_strategy()
        .unwrap()
        .unwrap();
        assert_eq!(
            strategy.calc_type,
            pixelforge_core::cost::CalcType::PerSecond
        );
    }
}
