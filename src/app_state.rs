use std::sync::Arc;

use crate::config::JobSettings;
use crate::db::JobStore;
use crate::services::access::ArtifactAccess;
use crate::services::queue::DispatchQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn DispatchQueue>,
    pub access: Arc<ArtifactAccess>,
    pub settings: Arc<JobSettings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        access: ArtifactAccess,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            queue,
            access: Arc::new(access),
            settings: Arc::new(settings),
        }
    }
}
