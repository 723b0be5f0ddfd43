use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::job::{JobStatus, ReportType};

/// Response after submitting a payload for report generation.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub check_status_url: String,
    pub estimated_completion: String,
}

/// One artifact as returned on status polls, with a freshly issued
/// time-limited access handle. Handles are never cached between polls.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactView {
    #[serde(rename = "type")]
    pub kind: ReportType,
    pub storage_key: String,
    pub access_handle: String,
    pub expires_in_seconds: u32,
    pub metadata: serde_json::Value,
}

/// Grouping descriptor for all artifacts produced by one job.
#[derive(Debug, Serialize)]
pub struct FolderView {
    pub container: String,
    pub prefix: String,
    pub description: String,
}

/// Response for querying job status. Fields beyond the base set are
/// status-conditional.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<ArtifactView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderView>,
    /// Legacy echo of the executive artifact for older clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<ArtifactView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Structured error body returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
}
