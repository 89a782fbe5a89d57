use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelforge_db::PgStore;
use pixelforge_engine::{
    AdapterGateway, CompletionPoller, GenerationEngine, TaskRunner, WorkflowEngine,
};
use pixelforge_events::EventBus;
use pixelforge_storage::{BlobStore, LocalBlobStore};
use pixelforge_worker::{ClaimLoop, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelforge_worker=debug,pixelforge_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        blob_store_root = %config.blob_store_root,
        "Loaded worker configuration"
    );

    // --- Database (runs pending migrations) ---
    let pool = pixelforge_db::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    pixelforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database ready");

    // --- Collaborators ---
    let store = Arc::new(PgStore::new(pool.clone()));
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
        &config.blob_store_root,
        &config.public_base_url,
    ));
    let events = Arc::new(EventBus::default());
    let gateway = Arc::new(AdapterGateway::new(blobs.clone()));

    // --- Engines ---
    let generator = Arc::new(GenerationEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs.clone(),
        events.clone(),
        gateway.clone(),
    ));
    let workflow = Arc::new(WorkflowEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs.clone(),
        events.clone(),
        generator,
    ));
    let poller = Arc::new(CompletionPoller::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        blobs,
        events.clone(),
        gateway,
    ));
    let runner = Arc::new(TaskRunner::new(poller, workflow));

    // --- Claim loops ---
    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(config.concurrency);
    for _ in 0..config.concurrency {
        let claim_loop = ClaimLoop::new(pool.clone(), runner.clone(), config.poll_interval);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            claim_loop.run(cancel).await;
        }));
    }
    tracing::info!(loops = config.concurrency, "Worker started");

    // --- Shutdown ---
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c");
    tracing::info!("Shutdown signal received, draining");
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("Worker stopped");
}
