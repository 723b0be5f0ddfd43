use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::config::JobSettings;
use crate::db::{JobStore, JobStoreError};
use crate::models::job::{JobOutcome, JobStatus, ReportArtifact, ReportType};
use crate::services::generator::{safe_company_slug, ReportGenerator};
use crate::services::storage::BlobStore;

const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(500);

/// Fan-out / fan-in engine for one job: runs every generation task
/// concurrently, collects settled outcomes, and writes the single
/// terminal record.
///
/// Invoked once per dispatch message. A replay against a finalized job
/// is a no-op; a replay against a `PROCESSING` job resumes it, since a
/// redelivered message means the run that claimed the job died before
/// its terminal write landed.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    generators: Vec<Arc<dyn ReportGenerator>>,
    settings: JobSettings,
}

enum TaskOutcome {
    Produced(ReportArtifact),
    Failed { kind: ReportType, reason: String },
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        generators: Vec<Arc<dyn ReportGenerator>>,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            generators,
            settings,
        }
    }

    /// Run the full lifecycle for `job_id`: `PENDING -> PROCESSING`,
    /// concurrent generation, terminal write.
    pub async fn run(&self, job_id: Uuid) -> Result<(), OrchestratorError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(OrchestratorError::UnknownJob(job_id))?;

        match self.store.mark_processing(job_id).await {
            Ok(()) => {}
            Err(JobStoreError::StaleTransition { .. }) => {
                let current = self
                    .store
                    .get(job_id)
                    .await?
                    .ok_or(OrchestratorError::UnknownJob(job_id))?;
                if current.status.is_terminal() {
                    tracing::warn!(%job_id, status = %current.status, "job already finalized, skipping duplicate dispatch");
                    return Ok(());
                }
                // Still PROCESSING at delivery time: the run that claimed
                // this job never wrote its terminal record. Redo the work
                // so the job cannot stay PROCESSING forever.
                tracing::warn!(%job_id, status = %current.status, "resuming job left in PROCESSING by a dead run");
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%job_id, tasks = self.generators.len(), "starting generation fan-out");
        metrics::counter!("report_jobs_started").increment(1);

        let input = Arc::new(job.input);
        let mut handles = Vec::with_capacity(self.generators.len());

        for generator in &self.generators {
            let generator = Arc::clone(generator);
            let input = Arc::clone(&input);
            let blobs = Arc::clone(&self.blobs);
            let prefix = self.settings.report_prefix.clone();
            let task_timeout = self.settings.task_timeout;
            let kind = generator.kind();

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = timeout(
                    task_timeout,
                    produce_artifact(generator, &input, blobs, &prefix, job_id),
                )
                .await;
                metrics::histogram!(
                    "report_generation_seconds",
                    "report_type" => kind.to_string()
                )
                .record(started.elapsed().as_secs_f64());

                match result {
                    Ok(Ok(artifact)) => TaskOutcome::Produced(artifact),
                    Ok(Err(reason)) => TaskOutcome::Failed { kind, reason },
                    Err(_) => TaskOutcome::Failed {
                        kind,
                        reason: format!("timed out after {}s", task_timeout.as_secs()),
                    },
                }
            });
            handles.push((kind, handle));
        }

        // Fan-in: every task settles; one failure never aborts siblings.
        let mut artifacts = Vec::new();
        let mut failures: Vec<(ReportType, String)> = Vec::new();
        for (kind, handle) in handles {
            match handle.await {
                Ok(TaskOutcome::Produced(artifact)) => {
                    tracing::info!(%job_id, report_type = %artifact.kind, storage_key = %artifact.storage_key, "artifact produced");
                    artifacts.push(artifact);
                }
                Ok(TaskOutcome::Failed { kind, reason }) => {
                    tracing::warn!(%job_id, report_type = %kind, %reason, "generation task failed");
                    metrics::counter!("report_tasks_failed", "report_type" => kind.to_string())
                        .increment(1);
                    failures.push((kind, reason));
                }
                Err(join_err) => {
                    tracing::error!(%job_id, report_type = %kind, error = %join_err, "generation task aborted");
                    metrics::counter!("report_tasks_failed", "report_type" => kind.to_string())
                        .increment(1);
                    failures.push((kind, format!("task aborted: {join_err}")));
                }
            }
        }

        let outcome = JobOutcome::resolve(artifacts, &failures, self.generators.len());
        let terminal = outcome.status;

        self.finalize_with_retry(job_id, outcome).await?;

        metrics::counter!("report_jobs_finalized", "status" => terminal.to_string()).increment(1);
        tracing::info!(%job_id, status = %terminal, "job finalized");
        Ok(())
    }

    /// The terminal write is the one store operation worth retrying:
    /// losing it would strand the job in PROCESSING forever.
    async fn finalize_with_retry(
        &self,
        job_id: Uuid,
        outcome: JobOutcome,
    ) -> Result<(), OrchestratorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .finalize(job_id, JobStatus::Processing, outcome.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(JobStoreError::StaleTransition { .. }) => {
                    tracing::warn!(%job_id, "job already finalized elsewhere, dropping duplicate terminal write");
                    return Ok(());
                }
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(%job_id, attempt, error = %e, "terminal write failed, backing off");
                    sleep(FINALIZE_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Render one document and persist it; returns the artifact record or a
/// human-readable failure reason.
async fn produce_artifact(
    generator: Arc<dyn ReportGenerator>,
    input: &serde_json::Value,
    blobs: Arc<dyn BlobStore>,
    prefix: &str,
    job_id: Uuid,
) -> Result<ReportArtifact, String> {
    let kind = generator.kind();
    let document = generator.generate(input).await.map_err(|e| e.to_string())?;

    let slug = safe_company_slug(&document.company_name);
    let stamp = document.generated_at.format("%Y%m%d_%H%M%S");
    let storage_key = format!(
        "{prefix}{slug}/{job_id}/{kind}_report_{stamp}.{}",
        document.file_extension
    );

    blobs
        .put(&storage_key, &document.bytes, document.content_type)
        .await
        .map_err(|e| format!("blob upload failed: {e}"))?;

    Ok(ReportArtifact {
        kind,
        storage_key,
        metadata: json!({
            "company_name": document.company_name,
            "generated_at": document.generated_at.to_rfc3339(),
            "content_type": document.content_type,
            "size_bytes": document.bytes.len(),
        }),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no job record for dispatched id {0}")]
    UnknownJob(Uuid),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}
