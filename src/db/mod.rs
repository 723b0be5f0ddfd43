use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::models::job::{JobOutcome, JobStatus, ReportJob};

mod pg;

pub use pg::PgJobStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Durable keyed job record store — the only synchronization primitive
/// between ingress and worker.
///
/// Every mutation is conditional on the record's current status, so a
/// duplicate dispatch or a retried write can never resurrect a terminal
/// job or finalize it twice.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a fresh `PENDING` record. Fails with `AlreadyExists` on an
    /// id collision.
    async fn create(&self, job: &ReportJob) -> Result<(), JobStoreError>;

    /// Fetch the current record, if any.
    async fn get(&self, id: Uuid) -> Result<Option<ReportJob>, JobStoreError>;

    /// Conditional `PENDING -> PROCESSING` transition. Rejects any other
    /// current status with `StaleTransition`.
    async fn mark_processing(&self, id: Uuid) -> Result<(), JobStoreError>;

    /// The single terminal write, conditional on `expected` being the
    /// record's current status.
    async fn finalize(
        &self,
        id: Uuid,
        expected: JobStatus,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), JobStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("stale transition for job {id}: record is no longer {expected}")]
    StaleTransition { id: Uuid, expected: JobStatus },

    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
