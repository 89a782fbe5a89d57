//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Runtime configuration for the worker process.
///
/// All fields except `DATABASE_URL` have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Directory result blobs are written under (`BLOB_STORE_ROOT`,
    /// default `./data/blobs`).
    pub blob_store_root: String,
    /// Public URL prefix fronting the blob root (`PUBLIC_BASE_URL`,
    /// default `http://localhost:3000/files`).
    pub public_base_url: String,
    /// Parallel claim loops (`WORKER_CONCURRENCY`, default `4`).
    pub concurrency: usize,
    /// Queue poll interval (`WORKER_POLL_INTERVAL_MS`, default `1000`).
    pub poll_interval: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let blob_store_root =
            std::env::var("BLOB_STORE_ROOT").unwrap_or_else(|_| "./data/blobs".into());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/files".into());

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("WORKER_POLL_INTERVAL_MS must be a valid u64");

        Self {
            database_url,
            blob_store_root,
            public_base_url,
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }
}
