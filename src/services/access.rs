use std::sync::Arc;

use serde::Serialize;

use crate::services::storage::{BlobStore, StorageError};

/// A freshly issued, time-limited retrieval handle for one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedHandle {
    pub url: String,
    pub expires_in_seconds: u32,
}

/// Stateless issuer of artifact access handles.
///
/// A pure function of `(storage_key, ttl)`; handles are regenerated on
/// every status read and never persisted, so a poller can never receive
/// an expired handle from stale state.
pub struct ArtifactAccess {
    blobs: Arc<dyn BlobStore>,
    ttl_secs: u32,
}

impl ArtifactAccess {
    pub fn new(blobs: Arc<dyn BlobStore>, ttl_secs: u32) -> Self {
        Self { blobs, ttl_secs }
    }

    pub fn container(&self) -> &str {
        self.blobs.container()
    }

    pub async fn issue(&self, storage_key: &str) -> Result<IssuedHandle, StorageError> {
        let url = self.blobs.presign_get(storage_key, self.ttl_secs).await?;
        Ok(IssuedHandle {
            url,
            expires_in_seconds: self.ttl_secs,
        })
    }
}
