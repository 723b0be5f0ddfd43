use serde_json::json;
use uuid::Uuid;

use report_forge::config::AppConfig;
use report_forge::db::{self, JobStore, JobStoreError, PgJobStore};
use report_forge::models::job::{JobOutcome, JobStatus, ReportArtifact, ReportJob, ReportType};
use report_forge::services::queue::{DispatchQueue, RedisDispatchQueue};
use report_forge::services::storage::{BlobStore, S3BlobStore};

/// Integration test: job store transitions, dispatch queue, blob storage.
///
/// Verifies against real backends:
/// 1. Conditional status transitions (create / mark_processing / finalize)
/// 2. Terminal records rejecting further writes
/// 3. Queue enqueue/dequeue/complete round trip
/// 4. Blob upload and presigned URL issuance
///
/// Note: this requires running PostgreSQL, Redis, and S3-compatible
/// storage instances configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");
    let store = PgJobStore::new(db_pool);

    // 1. Create and fetch a job
    let job = ReportJob::new(
        json!({"responses": {"company-name": "Integration Test Co"}}),
        chrono::Duration::days(1),
    );
    store.create(&job).await.expect("Failed to create job");

    let err = store.create(&job).await.unwrap_err();
    assert!(matches!(err, JobStoreError::AlreadyExists(_)));

    let fetched = store
        .get(job.id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(fetched.status, JobStatus::Pending);
    assert!(fetched.artifacts.is_empty());

    // 2. Conditional transition to PROCESSING; a second attempt is stale
    store
        .mark_processing(job.id)
        .await
        .expect("Failed to mark processing");
    let err = store.mark_processing(job.id).await.unwrap_err();
    assert!(matches!(err, JobStoreError::StaleTransition { .. }));

    // 3. Queue round trip
    let queue = RedisDispatchQueue::new(&config.redis_url).expect("Failed to initialize queue");
    queue.enqueue(job.id).await.expect("Failed to enqueue");
    assert!(queue.depth().await.expect("Failed to read depth") >= 1);
    let dequeued = loop {
        match queue.dequeue().await.expect("Failed to dequeue") {
            Some(id) if id == job.id => break id,
            Some(_) => continue, // another test's message
            None => panic!("enqueued dispatch not found"),
        }
    };
    queue.complete(dequeued).await.expect("Failed to complete");

    // 4. Blob upload and handle issuance
    let blobs = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize blob store");

    let storage_key = format!("integration-test/{}/executive_report.json", job.id);
    blobs
        .put(&storage_key, b"{\"report\":\"executive\"}", "application/json")
        .await
        .expect("Blob upload failed");

    let url = blobs
        .presign_get(&storage_key, 60)
        .await
        .expect("Presign failed");
    assert!(url.contains(&storage_key));

    // 5. Finalize and verify the record is terminal
    let outcome = JobOutcome::resolve(
        vec![ReportArtifact {
            kind: ReportType::Executive,
            storage_key: storage_key.clone(),
            metadata: json!({"company_name": "Integration Test Co"}),
        }],
        &[],
        1,
    );
    store
        .finalize(job.id, JobStatus::Processing, outcome)
        .await
        .expect("Failed to finalize");

    let finalized = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(finalized.status, JobStatus::Completed);
    assert_eq!(finalized.artifacts.len(), 1);
    assert!(finalized.updated_at >= finalized.created_at);

    // Terminal records reject further writes
    let err = store
        .finalize(
            job.id,
            JobStatus::Processing,
            JobOutcome::dispatch_failed("should not apply".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::StaleTransition { .. }));

    let err = store.mark_processing(job.id).await.unwrap_err();
    assert!(matches!(err, JobStoreError::StaleTransition { .. }));

    // Unknown ids stay unknown
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}
