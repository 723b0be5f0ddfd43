use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use report_forge::config::AppConfig;
use report_forge::db::{self, JobStore, PgJobStore};
use report_forge::services::generator::generator_for;
use report_forge::services::orchestrator::{Orchestrator, OrchestratorError};
use report_forge::services::queue::{DispatchQueue, RedisDispatchQueue};
use report_forge::services::storage::{BlobStore, S3BlobStore};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting report generation worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let settings = config.job_settings().expect("Invalid report job settings");

    // Initialize job store
    tracing::info!("Connecting to PostgreSQL job store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));

    // Initialize services
    tracing::info!("Initializing services");
    let blobs: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::new(
            &config.s3_bucket,
            &config.s3_region,
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
        )
        .expect("Failed to initialize blob storage client"),
    );

    let queue: Arc<dyn DispatchQueue> =
        Arc::new(RedisDispatchQueue::new(&config.redis_url).expect("Failed to initialize queue"));

    let generators = settings
        .expected_types
        .iter()
        .map(|kind| generator_for(*kind))
        .collect();

    let orchestrator = Orchestrator::new(store, Arc::clone(&blobs), generators, settings);

    tracing::info!("Worker ready, starting dispatch loop");

    // Main processing loop
    loop {
        match process_next_dispatch(queue.as_ref(), &orchestrator).await {
            Ok(true) => {
                tracing::debug!("Dispatch processed, checking for next");
            }
            Ok(false) => {
                tracing::trace!("No dispatches available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing dispatch, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Consume the next dispatch message.
/// Returns Ok(true) if a message was handled, Ok(false) if none available.
async fn process_next_dispatch(
    queue: &dyn DispatchQueue,
    orchestrator: &Orchestrator,
) -> Result<bool, Box<dyn std::error::Error>> {
    let job_id = match queue.dequeue().await? {
        Some(id) => id,
        None => {
            if let Ok(depth) = queue.depth().await {
                metrics::gauge!("report_queue_depth").set(depth as f64);
            }
            return Ok(false);
        }
    };

    tracing::info!(%job_id, "Processing dispatch");

    match orchestrator.run(job_id).await {
        Ok(()) => {
            queue.complete(job_id).await?;
            Ok(true)
        }
        Err(OrchestratorError::UnknownJob(_)) => {
            // A message with no job row can never make progress; drop it.
            tracing::error!(%job_id, "Dropping dispatch with no job record");
            queue.complete(job_id).await?;
            Ok(true)
        }
        Err(e) => {
            // Transient store failure: put the id back so another pass
            // (or another worker) can pick it up. The store's conditional
            // transitions keep a replay from double-finalizing.
            tracing::error!(%job_id, error = %e, "Orchestration failed, re-queueing dispatch");
            queue.enqueue(job_id).await?;
            queue.complete(job_id).await?;
            Ok(true)
        }
    }
}
