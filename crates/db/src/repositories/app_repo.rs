//! Repository for `apps` and `app_steps`. Read-only to the core; step
//! definitions are written by configuration tooling.

use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::app::{App, AppStep};

/// Column list for `apps` queries.
const APP_COLUMNS: &str = "id, name, created_at";

/// Column list for `app_steps` queries.
const STEP_COLUMNS: &str =
    "id, app_id, step_order, model_id, prompt_template, config, requires_approval";

/// Lookup operations for apps and their ordered steps.
pub struct AppRepo;

impl AppRepo {
    /// Find an app by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<App>, StoreError> {
        let query = format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1");
        Ok(sqlx::query_as::<_, App>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// The step at a given 1-based order, if the app has one.
    pub async fn step_at(
        pool: &PgPool,
        app_id: DbId,
        step_order: i32,
    ) -> Result<Option<AppStep>, StoreError> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM app_steps \
             WHERE app_id = $1 AND step_order = $2"
        );
        Ok(sqlx::query_as::<_, AppStep>(&query)
            .bind(app_id)
            .bind(step_order)
            .fetch_optional(pool)
            .await?)
    }

    /// All steps of an app in ascending order.
    pub async fn steps(pool: &PgPool, app_id: DbId) -> Result<Vec<AppStep>, StoreError> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM app_steps \
             WHERE app_id = $1 ORDER BY step_order ASC"
        );
        Ok(sqlx::query_as::<_, AppStep>(&query)
            .bind(app_id)
            .fetch_all(pool)
            .await?)
    }
}
