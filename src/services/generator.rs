use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::job::ReportType;

/// One rendered document, ready to be stored as a blob.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_extension: &'static str,
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
}

/// A generation task: turns the submitted payload into exactly one named
/// document, or fails. Instances run independently per job; the built-in
/// generators below are replaceable templates, not part of the
/// orchestration core.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    fn kind(&self) -> ReportType;

    async fn generate(&self, input: &Value) -> Result<GeneratedDocument, GeneratorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("{0}")]
    Failed(String),

    #[error("rendering failed: {0}")]
    Render(#[from] serde_json::Error),
}

/// Pull the customer's company name out of the assessment payload.
///
/// Looks at `responses.company-name` first, then the leading comma-field
/// of `responses.business-owner` ("Jane Doe, Acme Ltd" -> "Jane Doe").
pub fn extract_company_name(input: &Value) -> String {
    let responses = &input["responses"];

    if let Some(name) = responses["company-name"].as_str() {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    if let Some(owner) = responses["business-owner"].as_str() {
        if let Some(first) = owner.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    "customer".to_string()
}

/// Sanitize a company name for use as a blob key path segment.
pub fn safe_company_slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn render(kind: ReportType, company_name: String, body: Value) -> Result<GeneratedDocument, GeneratorError> {
    let generated_at = Utc::now();
    let document = json!({
        "report": kind.to_string(),
        "meta": {
            "company_name": company_name,
            "generated_at": generated_at.to_rfc3339(),
        },
        "body": body,
    });
    Ok(GeneratedDocument {
        bytes: serde_json::to_vec_pretty(&document)?,
        content_type: "application/json",
        file_extension: "json",
        company_name,
        generated_at,
    })
}

/// Executive summary: headline business context for decision makers.
pub struct ExecutiveSummaryGenerator;

#[async_trait]
impl ReportGenerator for ExecutiveSummaryGenerator {
    fn kind(&self) -> ReportType {
        ReportType::Executive
    }

    async fn generate(&self, input: &Value) -> Result<GeneratedDocument, GeneratorError> {
        let responses = input["responses"]
            .as_object()
            .ok_or_else(|| GeneratorError::Failed("payload has no responses object".into()))?;

        let company_name = extract_company_name(input);
        let body = json!({
            "industry": responses.get("industry").cloned().unwrap_or(Value::Null),
            "business_problem": responses
                .get("business-problem")
                .cloned()
                .unwrap_or(Value::Null),
            "response_count": responses.len(),
        });
        render(self.kind(), company_name, body)
    }
}

/// Technical deep dive: full echo of the assessment responses plus
/// per-section counts.
pub struct TechnicalDeepDiveGenerator;

#[async_trait]
impl ReportGenerator for TechnicalDeepDiveGenerator {
    fn kind(&self) -> ReportType {
        ReportType::Technical
    }

    async fn generate(&self, input: &Value) -> Result<GeneratedDocument, GeneratorError> {
        let responses = input["responses"]
            .as_object()
            .ok_or_else(|| GeneratorError::Failed("payload has no responses object".into()))?;

        let company_name = extract_company_name(input);
        let sections: Vec<&String> = responses.keys().collect();
        let body = json!({
            "sections": sections,
            "responses": responses,
        });
        render(self.kind(), company_name, body)
    }
}

/// Compliance report: which expected assessment areas were answered.
pub struct ComplianceReportGenerator;

#[async_trait]
impl ReportGenerator for ComplianceReportGenerator {
    fn kind(&self) -> ReportType {
        ReportType::Compliance
    }

    async fn generate(&self, input: &Value) -> Result<GeneratedDocument, GeneratorError> {
        let responses = input["responses"]
            .as_object()
            .ok_or_else(|| GeneratorError::Failed("payload has no responses object".into()))?;

        let company_name = extract_company_name(input);
        let areas = ["data-residency", "security", "governance", "industry"];
        let checklist: Vec<Value> = areas
            .iter()
            .map(|area| {
                json!({
                    "area": area,
                    "answered": responses.contains_key(*area),
                })
            })
            .collect();
        let body = json!({ "checklist": checklist });
        render(self.kind(), company_name, body)
    }
}

/// Built-in generator for a report kind.
pub fn generator_for(kind: ReportType) -> std::sync::Arc<dyn ReportGenerator> {
    match kind {
        ReportType::Executive => std::sync::Arc::new(ExecutiveSummaryGenerator),
        ReportType::Technical => std::sync::Arc::new(TechnicalDeepDiveGenerator),
        ReportType::Compliance => std::sync::Arc::new(ComplianceReportGenerator),
    }
}
