//! In-memory doubles for the component seams, used by the test suites.
//!
//! The doubles keep the production contracts: the memory job store
//! enforces the same conditional-transition semantics as the Postgres
//! implementation, and the memory blob store issues a distinct handle on
//! every presign call.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{JobStore, JobStoreError};
use crate::models::job::{JobOutcome, JobStatus, ReportJob, ReportType};
use crate::services::generator::{GeneratedDocument, GeneratorError, ReportGenerator};
use crate::services::queue::{DispatchQueue, QueueError};
use crate::services::storage::{BlobStore, StorageError};

/// Mutex-guarded map with the production store's CAS semantics.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, ReportJob>>,
    failing_creates: Mutex<u32>,
    failing_finalizes: Mutex<u32>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` create calls fail as if the store were down.
    pub async fn fail_creates(&self, n: u32) {
        *self.failing_creates.lock().await = n;
    }

    /// Make the next `n` finalize calls fail as if the store were down.
    pub async fn fail_finalizes(&self, n: u32) {
        *self.failing_finalizes.lock().await = n;
    }

    pub async fn status_of(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.lock().await.get(&id).map(|j| j.status)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &ReportJob) -> Result<(), JobStoreError> {
        {
            let mut failing = self.failing_creates.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(JobStoreError::Unavailable(
                    "injected create failure".to_string(),
                ));
            }
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportJob>, JobStoreError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.status != JobStatus::Pending {
            return Err(JobStoreError::StaleTransition {
                id,
                expected: JobStatus::Pending,
            });
        }
        job.status = JobStatus::Processing;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        expected: JobStatus,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError> {
        {
            let mut failing = self.failing_finalizes.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(JobStoreError::Unavailable(
                    "injected finalize failure".to_string(),
                ));
            }
        }

        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.status != expected {
            return Err(JobStoreError::StaleTransition { id, expected });
        }
        job.status = outcome.status;
        job.artifacts = outcome.artifacts;
        job.error_message = outcome.error_message;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        Ok(())
    }
}

/// Blob store double; objects live in a map, presigned URLs carry a
/// fresh nonce on every call.
pub struct MemoryBlobStore {
    name: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn has_key(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn container(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String, StorageError> {
        Ok(format!(
            "https://{}.blobs.test/{key}?expires={ttl_secs}&sig={}",
            self.name,
            Uuid::new_v4().simple()
        ))
    }
}

/// Dispatch queue double with enqueue failure injection.
#[derive(Default)]
pub struct MemoryDispatchQueue {
    queue: Mutex<VecDeque<Uuid>>,
    processing: Mutex<Vec<Uuid>>,
    failing_enqueues: Mutex<u32>,
}

impl MemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` enqueue calls fail as if Redis were down.
    pub async fn fail_enqueues(&self, n: u32) {
        *self.failing_enqueues.lock().await = n;
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        {
            let mut failing = self.failing_enqueues.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(QueueError::Unavailable(
                    "injected enqueue failure".to_string(),
                ));
            }
        }
        self.queue.lock().await.push_back(job_id);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Uuid>, QueueError> {
        let popped = self.queue.lock().await.pop_front();
        if let Some(id) = popped {
            self.processing.lock().await.push(id);
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.processing.lock().await.retain(|id| *id != job_id);
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.queue.lock().await.len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Generation task double with scripted behavior per report kind.
pub struct ScriptedGenerator {
    kind: ReportType,
    behavior: Behavior,
}

enum Behavior {
    Succeed { company: String },
    Fail(String),
    Hang,
}

impl ScriptedGenerator {
    pub fn succeed(kind: ReportType, company: &str) -> Self {
        Self {
            kind,
            behavior: Behavior::Succeed {
                company: company.to_string(),
            },
        }
    }

    pub fn fail(kind: ReportType, reason: &str) -> Self {
        Self {
            kind,
            behavior: Behavior::Fail(reason.to_string()),
        }
    }

    pub fn hang(kind: ReportType) -> Self {
        Self {
            kind,
            behavior: Behavior::Hang,
        }
    }
}

#[async_trait]
impl ReportGenerator for ScriptedGenerator {
    fn kind(&self) -> ReportType {
        self.kind
    }

    async fn generate(&self, _input: &serde_json::Value) -> Result<GeneratedDocument, GeneratorError> {
        match &self.behavior {
            Behavior::Succeed { company } => {
                let generated_at = Utc::now();
                let body = serde_json::json!({
                    "report": self.kind.to_string(),
                    "scripted": true,
                });
                Ok(GeneratedDocument {
                    bytes: serde_json::to_vec(&body)?,
                    content_type: "application/json",
                    file_extension: "json",
                    company_name: company.clone(),
                    generated_at,
                })
            }
            Behavior::Fail(reason) => Err(GeneratorError::Failed(reason.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
