use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::models::job::ReportType;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string for the job store
    pub database_url: String,

    /// Redis connection string for the dispatch queue
    pub redis_url: String,

    /// Blob store bucket name
    pub s3_bucket: String,

    /// Blob store endpoint URL (S3-compatible)
    pub s3_endpoint: String,

    /// Blob store region
    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// Blob store access key ID
    pub s3_access_key: String,

    /// Blob store secret access key
    pub s3_secret_key: String,

    /// Key prefix under which report objects are written
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,

    /// Time-to-live for issued access handles, in seconds
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u32,

    /// Comma-separated set of expected report types
    #[serde(default = "default_report_types")]
    pub report_types: String,

    /// Wall-clock bound for a single generation task, in seconds
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Days before a job record becomes eligible for purging
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_report_prefix() -> String {
    "reports/".to_string()
}

fn default_presign_ttl_secs() -> u32 {
    3600
}

fn default_report_types() -> String {
    "executive,technical,compliance".to_string()
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_retention_days() -> i64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Derive the immutable per-job settings handed to components.
    pub fn job_settings(&self) -> Result<JobSettings, ConfigError> {
        let mut expected_types = Vec::new();
        for raw in self.report_types.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let kind = ReportType::from_str(raw)
                .map_err(|_| ConfigError::InvalidReportType(raw.to_string()))?;
            if !expected_types.contains(&kind) {
                expected_types.push(kind);
            }
        }
        if expected_types.is_empty() {
            return Err(ConfigError::EmptyReportTypes);
        }

        Ok(JobSettings {
            expected_types,
            report_prefix: self.report_prefix.clone(),
            presign_ttl_secs: self.presign_ttl_secs,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            retention: chrono::Duration::days(self.retention_days),
        })
    }
}

/// Immutable settings shared by ingress and worker; constructed once at
/// process start and passed explicitly, never read from ambient state.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub expected_types: Vec<ReportType>,
    pub report_prefix: String,
    pub presign_ttl_secs: u32,
    pub task_timeout: Duration,
    pub retention: chrono::Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown report type in REPORT_TYPES: {0}")]
    InvalidReportType(String),

    #[error("REPORT_TYPES must name at least one report type")]
    EmptyReportTypes,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_types(types: &str) -> AppConfig {
        AppConfig {
            bind_addr: default_bind_addr(),
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost".into(),
            s3_bucket: "reports".into(),
            s3_endpoint: "http://localhost:9000".into(),
            s3_region: default_s3_region(),
            s3_access_key: "key".into(),
            s3_secret_key: "secret".into(),
            report_prefix: default_report_prefix(),
            presign_ttl_secs: default_presign_ttl_secs(),
            report_types: types.into(),
            task_timeout_secs: default_task_timeout_secs(),
            retention_days: default_retention_days(),
        }
    }

    #[test]
    fn parses_default_report_types() {
        let settings = config_with_types("executive,technical,compliance")
            .job_settings()
            .unwrap();
        assert_eq!(
            settings.expected_types,
            vec![
                ReportType::Executive,
                ReportType::Technical,
                ReportType::Compliance
            ]
        );
    }

    #[test]
    fn deduplicates_and_trims_report_types() {
        let settings = config_with_types(" executive , executive, technical ,")
            .job_settings()
            .unwrap();
        assert_eq!(
            settings.expected_types,
            vec![ReportType::Executive, ReportType::Technical]
        );
    }

    #[test]
    fn rejects_unknown_report_type() {
        let err = config_with_types("executive,quarterly")
            .job_settings()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidReportType(t) if t == "quarterly"));
    }

    #[test]
    fn rejects_empty_report_types() {
        let err = config_with_types(" , ").job_settings().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyReportTypes));
    }
}
