use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use report_forge::app_state::AppState;
use report_forge::config::AppConfig;
use report_forge::db::{self, PgJobStore};
use report_forge::routes;
use report_forge::services::access::ArtifactAccess;
use report_forge::services::queue::RedisDispatchQueue;
use report_forge::services::storage::{BlobStore, S3BlobStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");
    let settings = config
        .job_settings()
        .expect("Invalid report job settings");

    tracing::info!("Initializing report-forge server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("report_jobs_submitted", "Total report jobs admitted");
    metrics::describe_counter!(
        "report_jobs_started",
        "Total jobs that entered PROCESSING"
    );
    metrics::describe_counter!(
        "report_jobs_finalized",
        "Total jobs finalized, by terminal status"
    );
    metrics::describe_counter!(
        "report_tasks_failed",
        "Total generation tasks that failed, by report type"
    );
    metrics::describe_histogram!(
        "report_generation_seconds",
        "Time for one generation task to settle"
    );
    metrics::describe_gauge!(
        "report_queue_depth",
        "Current number of pending dispatches in the queue"
    );

    // Initialize job store
    tracing::info!("Connecting to PostgreSQL job store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store = Arc::new(PgJobStore::new(db_pool));

    // Initialize blob store and access handle issuer
    tracing::info!("Initializing blob storage client");
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
    let access = ArtifactAccess::new(Arc::clone(&blobs), settings.presign_ttl_secs);

    // Initialize dispatch queue
    tracing::info!("Connecting to Redis dispatch queue");
    let queue =
        Arc::new(RedisDispatchQueue::new(&config.redis_url).expect("Failed to initialize queue"));

    // Create shared application state
    let state = AppState::new(store, queue, access, settings);

    // Build API routes
    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!("Starting report-forge on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
