//! Postgres persistence for the orchestration core.
//!
//! Entity models live in [`models`], repositories (zero-sized structs with
//! async methods taking `&PgPool`) in [`repositories`], and the
//! collaborator traits the engines are injected with in [`store`].

pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::StoreError;
pub use store::{CreditLedger, ExecutionStore, GenerationStore, ModelCatalog, PgStore, TaskQueue};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to the database and run pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Cheap connectivity check.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
