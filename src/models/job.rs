use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a report job, from admission to terminal outcome.
///
/// Statuses only ever advance: `PENDING -> PROCESSING -> {COMPLETED |
/// PARTIAL | FAILED}`. Terminal records are never written again.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }
}

/// The fixed set of document kinds a job can produce.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportType {
    Executive,
    Technical,
    Compliance,
}

/// One produced output, blob-stored and referenced from the job record.
///
/// `metadata` is captured from the generation step (company label,
/// generation timestamp, content type) and is opaque to the orchestration
/// core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    #[serde(rename = "type")]
    pub kind: ReportType,
    pub storage_key: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A report generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// The submitted payload; immutable after creation.
    pub input: serde_json::Value,
    /// At most one entry per report type; empty until finalization.
    pub artifacts: Vec<ReportArtifact>,
    /// Present only when `status` is `FAILED`.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Retention horizon; an external sweeper purges expired rows.
    pub expires_at: DateTime<Utc>,
}

impl ReportJob {
    /// Build a fresh `PENDING` record with a random collision-resistant id.
    pub fn new(input: serde_json::Value, retention: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            input,
            artifacts: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + retention,
        }
    }
}

/// The single terminal write for a job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub artifacts: Vec<ReportArtifact>,
    pub error_message: Option<String>,
}

impl JobOutcome {
    /// Derive the terminal status from settled task results.
    ///
    /// All expected artifacts present -> `COMPLETED`; some -> `PARTIAL`;
    /// none -> `FAILED` with an aggregated message naming every failure.
    pub fn resolve(
        artifacts: Vec<ReportArtifact>,
        failures: &[(ReportType, String)],
        expected_count: usize,
    ) -> Self {
        let status = if artifacts.len() == expected_count {
            JobStatus::Completed
        } else if !artifacts.is_empty() {
            JobStatus::Partial
        } else {
            JobStatus::Failed
        };

        let error_message = if status == JobStatus::Failed {
            if failures.is_empty() {
                Some("no generation task produced an artifact".to_string())
            } else {
                Some(
                    failures
                        .iter()
                        .map(|(kind, reason)| format!("{kind}: {reason}"))
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            }
        } else {
            None
        };

        Self {
            status,
            artifacts,
            error_message,
        }
    }

    /// Outcome for a job whose dispatch to the worker queue was lost, so
    /// it must not be left `PENDING` forever.
    pub fn dispatch_failed(reason: String) -> Self {
        Self {
            status: JobStatus::Failed,
            artifacts: Vec::new(),
            error_message: Some(reason),
        }
    }
}
