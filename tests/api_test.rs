use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use report_forge::app_state::AppState;
use report_forge::config::JobSettings;
use report_forge::db::JobStore;
use report_forge::models::job::{JobStatus, ReportJob, ReportType};
use report_forge::routes;
use report_forge::services::access::ArtifactAccess;
use report_forge::services::generator::ReportGenerator;
use report_forge::services::orchestrator::Orchestrator;
use report_forge::services::queue::DispatchQueue;
use report_forge::testing::{MemoryBlobStore, MemoryDispatchQueue, MemoryJobStore, ScriptedGenerator};

struct TestHarness {
    app: Router,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryDispatchQueue>,
    blobs: Arc<MemoryBlobStore>,
    settings: JobSettings,
}

fn settings() -> JobSettings {
    JobSettings {
        expected_types: vec![
            ReportType::Executive,
            ReportType::Technical,
            ReportType::Compliance,
        ],
        report_prefix: "reports/".to_string(),
        presign_ttl_secs: 3600,
        task_timeout: Duration::from_secs(5),
        retention: chrono::Duration::days(30),
    }
}

fn harness() -> TestHarness {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryDispatchQueue::new());
    let blobs = Arc::new(MemoryBlobStore::new("report-bucket"));
    let settings = settings();
    let access = ArtifactAccess::new(
        Arc::clone(&blobs) as Arc<dyn report_forge::services::storage::BlobStore>,
        settings.presign_ttl_secs,
    );
    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::clone(&queue) as Arc<dyn DispatchQueue>,
        access,
        settings.clone(),
    );
    TestHarness {
        app: routes::api_router(state),
        store,
        queue,
        blobs,
        settings,
    }
}

impl TestHarness {
    /// Build the worker-side orchestrator over the same store and blobs.
    fn orchestrator(&self, generators: Vec<Arc<dyn ReportGenerator>>) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.store) as Arc<dyn JobStore>,
            Arc::clone(&self.blobs)
                as Arc<dyn report_forge::services::storage::BlobStore>,
            generators,
            self.settings.clone(),
        )
    }

    async fn submit(&self, payload: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn poll(&self, query: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/{query}"))
            .body(Body::empty())
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn assessment_payload() -> Value {
    json!({
        "responses": {
            "company-name": "Acme Ltd",
            "industry": "retail",
            "business-problem": "slow reporting"
        }
    })
}

fn all_succeed() -> Vec<Arc<dyn ReportGenerator>> {
    vec![
        Arc::new(ScriptedGenerator::succeed(ReportType::Executive, "Acme Ltd")),
        Arc::new(ScriptedGenerator::succeed(ReportType::Technical, "Acme Ltd")),
        Arc::new(ScriptedGenerator::succeed(ReportType::Compliance, "Acme Ltd")),
    ]
}

#[tokio::test]
async fn submit_returns_accepted_before_any_work_runs() {
    let h = harness();
    let (status, body) = h.submit(assessment_payload()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert!(body["check_status_url"].as_str().unwrap().starts_with("?job_id="));
    assert!(!body["estimated_completion"].as_str().unwrap().is_empty());

    let job_id = Uuid::parse_str(body["job_id"].as_str().unwrap()).unwrap();
    assert_eq!(h.store.status_of(job_id).await, Some(JobStatus::Pending));
    assert_eq!(h.queue.depth().await.unwrap(), 1);
    // No generation side effects yet.
    assert_eq!(h.blobs.object_count().await, 0);
}

#[tokio::test]
async fn submit_rejects_non_object_body() {
    let h = harness();
    let (status, body) = h.submit(json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("JSON object"));
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn submit_rejects_malformed_json_with_structured_error() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not valid json"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // Structured error body, not a plain-text rejection.
    let body = body_json(response).await;
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert_eq!(h.queue.depth().await.unwrap(), 0);
    assert_eq!(h.store.job_count().await, 0);
}

#[tokio::test]
async fn admission_failure_leaves_no_row_and_no_dispatch() {
    let h = harness();
    h.store.fail_creates(1).await;

    let (status, body) = h.submit(assessment_payload()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Failed to submit job"));
    assert!(body.get("job_id").is_none());

    // Nothing was admitted: no record, no dispatch for the worker.
    assert_eq!(h.store.job_count().await, 0);
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn status_without_job_id_is_bad_request() {
    let h = harness();
    let (status, body) = h.poll("").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing job_id parameter");
    assert_eq!(body["usage"], "GET /?job_id=xxx");
}

#[tokio::test]
async fn status_of_unknown_job_is_not_found() {
    let h = harness();
    let (status, body) = h.poll("?job_id=nonexistent-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Job not found");
    assert_eq!(body["job_id"], "nonexistent-id");

    let (status, body) = h.poll(&format!("?job_id={}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Job not found");
}

#[tokio::test]
async fn pending_job_reports_progress_without_artifacts() {
    let h = harness();
    let job = ReportJob::new(assessment_payload(), chrono::Duration::days(30));
    h.store.create(&job).await.unwrap();

    let (status, body) = h.poll(&format!("?job_id={}", job.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert!(body["message"].as_str().unwrap().contains("still processing"));
    assert!(body.get("artifacts").is_none());
    assert!(body.get("error_message").is_none());
}

#[tokio::test]
async fn completed_job_returns_bundle_with_fresh_handles() {
    let h = harness();
    let (_, submitted) = h.submit(assessment_payload()).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    h.orchestrator(all_succeed())
        .run(Uuid::parse_str(&job_id).unwrap())
        .await
        .unwrap();

    let (status, body) = h.poll(&format!("?job_id={job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["artifact_count"], 3);

    let artifacts = body["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 3);
    for artifact in artifacts {
        assert!(artifact["access_handle"].as_str().unwrap().starts_with("https://"));
        assert_eq!(artifact["expires_in_seconds"], 3600);
        assert_eq!(artifact["metadata"]["company_name"], "Acme Ltd");
    }

    // Folder descriptor groups the whole bundle.
    assert_eq!(body["folder"]["container"], "report-bucket");
    let prefix = body["folder"]["prefix"].as_str().unwrap();
    assert_eq!(prefix, format!("reports/acme_ltd/{job_id}/"));

    // Legacy echo points at the executive artifact.
    assert_eq!(body["primary"]["type"], "executive");

    // Repeated polls: same status and storage keys, different handles.
    let (_, second) = h.poll(&format!("?job_id={job_id}")).await;
    assert_eq!(second["status"], "COMPLETED");
    for (a, b) in artifacts.iter().zip(second["artifacts"].as_array().unwrap()) {
        assert_eq!(a["storage_key"], b["storage_key"]);
        assert_ne!(a["access_handle"], b["access_handle"]);
    }
}

#[tokio::test]
async fn partial_job_returns_only_surviving_artifact_types() {
    let h = harness();
    let (_, submitted) = h.submit(assessment_payload()).await;
    let job_id = Uuid::parse_str(submitted["job_id"].as_str().unwrap()).unwrap();

    let generators: Vec<Arc<dyn ReportGenerator>> = vec![
        Arc::new(ScriptedGenerator::succeed(ReportType::Executive, "Acme Ltd")),
        Arc::new(ScriptedGenerator::fail(ReportType::Technical, "model unavailable")),
        Arc::new(ScriptedGenerator::succeed(ReportType::Compliance, "Acme Ltd")),
    ];
    h.orchestrator(generators).run(job_id).await.unwrap();

    let (status, body) = h.poll(&format!("?job_id={job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PARTIAL");
    assert_eq!(body["artifact_count"], 2);

    let mut kinds: Vec<&str> = body["artifacts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap())
        .collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["compliance", "executive"]);
}

#[tokio::test]
async fn failed_job_surfaces_error_message_and_no_artifacts() {
    let h = harness();
    let (_, submitted) = h.submit(assessment_payload()).await;
    let job_id = Uuid::parse_str(submitted["job_id"].as_str().unwrap()).unwrap();

    let generators: Vec<Arc<dyn ReportGenerator>> = vec![
        Arc::new(ScriptedGenerator::fail(ReportType::Executive, "bad template")),
        Arc::new(ScriptedGenerator::fail(ReportType::Technical, "model unavailable")),
        Arc::new(ScriptedGenerator::fail(ReportType::Compliance, "render error")),
    ];
    h.orchestrator(generators).run(job_id).await.unwrap();

    let (status, body) = h.poll(&format!("?job_id={job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");
    assert!(body.get("artifacts").is_none());
    let message = body["error_message"].as_str().unwrap();
    assert!(message.contains("bad template"));
    assert!(message.contains("model unavailable"));
    assert!(message.contains("render error"));
}

#[tokio::test]
async fn lost_dispatch_marks_the_job_failed_instead_of_orphaning_it() {
    let h = harness();
    h.queue.fail_enqueues(1).await;

    let (status, body) = h.submit(assessment_payload()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Failed to dispatch"));

    let job_id = Uuid::parse_str(body["job_id"].as_str().unwrap()).unwrap();
    assert_eq!(h.store.status_of(job_id).await, Some(JobStatus::Failed));

    let (_, polled) = h.poll(&format!("?job_id={job_id}")).await;
    assert_eq!(polled["status"], "FAILED");
    assert!(polled["error_message"]
        .as_str()
        .unwrap()
        .contains("dispatch"));
}

#[tokio::test]
async fn concurrent_polls_of_a_completed_job_agree() {
    let h = harness();
    let (_, submitted) = h.submit(assessment_payload()).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();
    h.orchestrator(all_succeed())
        .run(Uuid::parse_str(&job_id).unwrap())
        .await
        .unwrap();

    let query = format!("?job_id={job_id}");
    let (first, second) = futures::join!(h.poll(&query), h.poll(&query));

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(first.1["status"], "COMPLETED");
    assert_eq!(second.1["status"], "COMPLETED");

    let keys = |body: &Value| -> Vec<String> {
        let mut keys: Vec<String> = body["artifacts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["storage_key"].as_str().unwrap().to_string())
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&first.1), keys(&second.1));
}
