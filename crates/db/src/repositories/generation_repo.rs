//! Repository for the `generations` table.
//!
//! Status transitions follow the generation state machine: `pending` to
//! `completed` (sync success), `pending` to `processing` to `completed`
//! (async success), and any non-terminal state to `failed`.

use pixelforge_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::generation::{CreateGeneration, Generation, GenerationCost};
use crate::models::status::GenerationStatus;

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, user_id, model_id, provider_link_id, status_id, \
    input_data, output_data, provider_request_body, \
    provider_cost_usd, user_credit_cost, profit_usd, \
    error_message, parent_generation_id, created_at, updated_at";

/// CRUD and transition operations for generations.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Insert a new `pending` generation.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGeneration,
    ) -> Result<Generation, StoreError> {
        let query = format!(
            "INSERT INTO generations \
                 (user_id, model_id, provider_link_id, status_id, input_data, parent_generation_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Generation>(&query)
            .bind(input.user_id)
            .bind(input.model_id)
            .bind(input.provider_link_id)
            .bind(GenerationStatus::Pending.id())
            .bind(&input.input_data)
            .bind(input.parent_generation_id)
            .fetch_one(pool)
            .await?)
    }

    /// Reuse a failed generation for a retry: back to `pending` with fresh
    /// inputs, clearing the previous attempt's outcome. Only `failed` rows
    /// owned by the requesting user qualify.
    pub async fn reset_for_retry(
        pool: &PgPool,
        id: DbId,
        input: &CreateGeneration,
    ) -> Result<Generation, StoreError> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $2, provider_link_id = $3, input_data = $4, \
                 output_data = NULL, provider_request_body = NULL, error_message = NULL, \
                 provider_cost_usd = NULL, user_credit_cost = NULL, profit_usd = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $5 AND status_id = $6 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(GenerationStatus::Pending.id())
            .bind(input.provider_link_id)
            .bind(&input.input_data)
            .bind(input.user_id)
            .bind(GenerationStatus::Failed.id())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "generation {id} cannot be retried: only the owner's failed generations qualify"
                ))
            })
    }

    /// Find a generation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Generation>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        Ok(sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// Record the sanitized request body that was sent to the provider.
    pub async fn set_request_body(
        pool: &PgPool,
        id: DbId,
        request_body: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE generations SET provider_request_body = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(request_body)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition to `processing` with the async operation handle in
    /// `output_data` and the cost fields charged at initiation.
    pub async fn mark_processing(
        pool: &PgPool,
        id: DbId,
        output_data: &Value,
        cost: &GenerationCost,
    ) -> Result<Generation, StoreError> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $2, output_data = $3, \
                 provider_cost_usd = $4, user_credit_cost = $5, profit_usd = $6, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(GenerationStatus::Processing.id())
            .bind(output_data)
            .bind(cost.provider_cost_usd)
            .bind(cost.user_credit_cost)
            .bind(cost.profit_usd)
            .fetch_one(pool)
            .await?)
    }

    /// Transition to `completed` with the normalized output.
    ///
    /// `cost` is `None` when it was already charged at async initiation.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        output_data: &Value,
        cost: Option<&GenerationCost>,
    ) -> Result<Generation, StoreError> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $2, output_data = $3, error_message = NULL, \
                 provider_cost_usd = COALESCE($4, provider_cost_usd), \
                 user_credit_cost = COALESCE($5, user_credit_cost), \
                 profit_usd = COALESCE($6, profit_usd), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(GenerationStatus::Completed.id())
            .bind(output_data)
            .bind(cost.map(|c| c.provider_cost_usd))
            .bind(cost.map(|c| c.user_credit_cost))
            .bind(cost.map(|c| c.profit_usd))
            .fetch_one(pool)
            .await?)
    }

    /// Transition to `failed` with a human-readable error message and,
    /// when available, the raw provider response for diagnosis.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
        output_data: Option<&Value>,
    ) -> Result<Generation, StoreError> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $2, error_message = $3, \
                 output_data = COALESCE($4, output_data), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(GenerationStatus::Failed.id())
            .bind(error_message)
            .bind(output_data)
            .fetch_one(pool)
            .await?)
    }
}
