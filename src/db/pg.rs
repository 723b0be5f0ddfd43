use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::{JobStore, JobStoreError};
use crate::models::job::{JobOutcome, JobStatus, ReportArtifact, ReportJob};

/// PostgreSQL-backed job store. All transitions are single-row conditional
/// updates keyed on the current status column.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<ReportJob, JobStoreError> {
        let id: Uuid = row.try_get("id")?;
        let status_str: String = row.try_get("status")?;
        let status = JobStatus::from_str(&status_str).map_err(|_| JobStoreError::Corrupt {
            id,
            reason: format!("unknown status {status_str:?}"),
        })?;
        let artifacts_json: serde_json::Value = row.try_get("artifacts")?;
        let artifacts: Vec<ReportArtifact> = serde_json::from_value(artifacts_json)?;

        Ok(ReportJob {
            id,
            status,
            input: row.try_get("input")?,
            artifacts,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &ReportJob) -> Result<(), JobStoreError> {
        let artifacts = serde_json::to_value(&job.artifacts)?;

        sqlx::query(
            r#"
            INSERT INTO report_jobs
                (id, status, input, artifacts, error_message, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(&job.input)
        .bind(artifacts)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                JobStoreError::AlreadyExists(job.id)
            }
            _ => JobStoreError::Database(e),
        })?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportJob>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, input, artifacts, error_message,
                   created_at, updated_at, expires_at
            FROM report_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::job_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), JobStoreError> {
        // updated_at uses the application clock, same source as created_at.
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(JobStatus::Processing.to_string())
        .bind(Utc::now())
        .bind(JobStatus::Pending.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(JobStoreError::NotFound(id)),
                Some(_) => Err(JobStoreError::StaleTransition {
                    id,
                    expected: JobStatus::Pending,
                }),
            };
        }

        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        expected: JobStatus,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError> {
        debug_assert!(outcome.status.is_terminal());
        let artifacts = serde_json::to_value(&outcome.artifacts)?;

        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET status = $2, artifacts = $3, error_message = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(id)
        .bind(outcome.status.to_string())
        .bind(artifacts)
        .bind(&outcome.error_message)
        .bind(Utc::now())
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(JobStoreError::NotFound(id)),
                Some(_) => Err(JobStoreError::StaleTransition { id, expected }),
            };
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
