use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    ArtifactView, ErrorBody, FolderView, JobStatusResponse, SubmitResponse,
};
use crate::models::job::{JobOutcome, JobStatus, ReportJob, ReportType};
use crate::services::generator::safe_company_slug;

const PROCESSING_MESSAGE: &str =
    "Job is still processing. Please check again in a few moments.";

/// POST / — Submit a payload for report bundle generation.
///
/// Returns 202 with the job id before any generation work begins: one
/// durable write, one dispatch signal, nothing awaited beyond that.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    // A malformed body gets the same structured error shape as every
    // other failure, not axum's plain-text rejection.
    let Json(payload) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    if !payload.is_object() {
        return Err(ApiError::InvalidBody(
            "request body must be a JSON object".to_string(),
        ));
    }

    let job = ReportJob::new(payload, state.settings.retention);

    // Admission failure before the row exists surfaces directly; no job
    // record is ever marked FAILED for a submission that was not admitted.
    state
        .store
        .create(&job)
        .await
        .map_err(|e| ApiError::Admission(e.to_string()))?;

    metrics::counter!("report_jobs_submitted").increment(1);

    if let Err(e) = state.queue.enqueue(job.id).await {
        // The record exists but the worker will never hear about it; a
        // terminal FAILED write keeps the poller from seeing an eternal
        // PENDING.
        tracing::error!(job_id = %job.id, error = %e, "dispatch failed, marking job FAILED");
        let outcome =
            JobOutcome::dispatch_failed(format!("dispatch to worker queue failed: {e}"));
        if let Err(store_err) = state
            .store
            .finalize(job.id, JobStatus::Pending, outcome)
            .await
        {
            tracing::error!(job_id = %job.id, error = %store_err, "failed to record dispatch failure");
        }
        return Err(ApiError::Dispatch {
            job_id: job.id,
            reason: e.to_string(),
        });
    }

    tracing::info!(job_id = %job.id, "job admitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status: JobStatus::Pending,
            message: "Job submitted successfully".to_string(),
            check_status_url: format!("?job_id={}", job.id),
            estimated_completion: "~3 minutes".to_string(),
        }),
    ))
}

/// GET /?job_id={id} — Poll job status.
///
/// Terminal jobs with artifacts get fresh access handles on every call;
/// handles are never reused across polls.
pub async fn job_status(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let raw_id = params.get("job_id").ok_or(ApiError::MissingJobId)?;

    // An unparseable id can match no job.
    let id = Uuid::parse_str(raw_id).map_err(|_| ApiError::NotFound(raw_id.clone()))?;

    let job = state
        .store
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(raw_id.clone()))?;

    let mut response = JobStatusResponse {
        job_id: job.id.to_string(),
        status: job.status,
        created_at: job.created_at,
        updated_at: job.updated_at,
        message: None,
        artifacts: None,
        artifact_count: None,
        folder: None,
        primary: None,
        error_message: None,
    };

    match job.status {
        JobStatus::Pending | JobStatus::Processing => {
            response.message = Some(PROCESSING_MESSAGE.to_string());
        }
        JobStatus::Failed => {
            response.error_message = Some(
                job.error_message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            );
        }
        JobStatus::Completed | JobStatus::Partial => {
            let mut views = Vec::with_capacity(job.artifacts.len());
            for artifact in &job.artifacts {
                match state.access.issue(&artifact.storage_key).await {
                    Ok(handle) => views.push(ArtifactView {
                        kind: artifact.kind,
                        storage_key: artifact.storage_key.clone(),
                        access_handle: handle.url,
                        expires_in_seconds: handle.expires_in_seconds,
                        metadata: artifact.metadata.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job.id,
                            report_type = %artifact.kind,
                            error = %e,
                            "failed to issue access handle, omitting artifact from response"
                        );
                    }
                }
            }

            response.primary = views
                .iter()
                .find(|v| v.kind == ReportType::Executive)
                .cloned();
            response.folder = Some(folder_view(&state, &job));
            response.artifact_count = Some(views.len());
            response.artifacts = Some(views);
        }
    }

    Ok(Json(response))
}

fn folder_view(state: &AppState, job: &ReportJob) -> FolderView {
    let company = job
        .artifacts
        .iter()
        .filter_map(|a| a.metadata["company_name"].as_str())
        .find(|name| !name.is_empty() && *name != "customer")
        .unwrap_or("customer");

    let container = state.access.container().to_string();
    let prefix = format!(
        "{}{}/{}/",
        state.settings.report_prefix,
        safe_company_slug(company),
        job.id
    );
    let description = format!(
        "All reports for this job are in: s3://{container}/{prefix}"
    );

    FolderView {
        container,
        prefix,
        description,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidBody(String),

    #[error("Missing job_id parameter")]
    MissingJobId,

    #[error("Job not found")]
    NotFound(String),

    #[error("Failed to submit job: {0}")]
    Admission(String),

    #[error("Failed to dispatch job: {reason}")]
    Dispatch { job_id: Uuid, reason: String },

    #[error("Failed to check job status: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidBody(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    job_id: None,
                    usage: None,
                },
            ),
            ApiError::MissingJobId => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Missing job_id parameter".to_string(),
                    job_id: None,
                    usage: Some("GET /?job_id=xxx".to_string()),
                },
            ),
            ApiError::NotFound(job_id) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "Job not found".to_string(),
                    job_id: Some(job_id),
                    usage: None,
                },
            ),
            ApiError::Admission(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: format!("Failed to submit job: {reason}"),
                    job_id: None,
                    usage: None,
                },
            ),
            ApiError::Dispatch { job_id, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: format!("Failed to dispatch job: {reason}"),
                    job_id: Some(job_id.to_string()),
                    usage: None,
                },
            ),
            ApiError::Internal(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: format!("Failed to check job status: {reason}"),
                    job_id: None,
                    usage: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
