//! Generation entity models and DTOs.
//!
//! A `Generation` is one billed invocation of a provider. Exactly one of
//! `{completed with output result, failed with error message, processing
//! with operation name}` holds at any time; the repository methods enforce
//! the transitions.

use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Generation {
    pub id: DbId,
    pub user_id: DbId,
    pub model_id: DbId,
    pub provider_link_id: DbId,
    pub status_id: StatusId,
    /// Normalized input field map (post-coercion, files as URLs).
    pub input_data: Value,
    /// Provider-normalized result; carries `operationName` while
    /// async-pending.
    pub output_data: Option<Value>,
    /// Sanitized copy of the request actually sent to the provider.
    pub provider_request_body: Option<Value>,
    pub provider_cost_usd: Option<f64>,
    pub user_credit_cost: Option<i64>,
    pub profit_usd: Option<f64>,
    pub error_message: Option<String>,
    /// Provenance link, e.g. a video generated from an image generation.
    pub parent_generation_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Generation {
    /// The long-running operation name, when async-pending.
    pub fn operation_name(&self) -> Option<&str> {
        self.output_data
            .as_ref()
            .and_then(|o| o.get("operationName"))
            .and_then(Value::as_str)
    }
}

/// DTO for inserting a new generation.
#[derive(Debug, Clone)]
pub struct CreateGeneration {
    pub user_id: DbId,
    pub model_id: DbId,
    pub provider_link_id: DbId,
    pub input_data: Value,
    pub parent_generation_id: Option<DbId>,
}

/// Cost fields attached when a generation is charged.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationCost {
    pub provider_cost_usd: f64,
    pub user_credit_cost: i64,
    pub profit_usd: f64,
}
