use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// API surface: submission and polling on `/`, health probe on `/health`.
/// The metrics route is mounted separately (it carries its own state).
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(jobs::job_status).post(jobs::submit_job))
        .route("/health", get(health::health_check))
        .with_state(state)
}
