use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Narrow blob storage contract: write-once object puts plus time-limited
/// retrieval URL issuance. Keys embed the job id and a timestamp, so no
/// key is ever written twice.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket / container name, for folder descriptors in status responses.
    fn container(&self) -> &str;

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Issue a presigned GET URL valid for `ttl_secs`. Side-effect free;
    /// each call is independent of previously issued URLs.
    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String, StorageError>;
}

/// S3-compatible blob store client (AWS S3, MinIO, R2).
pub struct S3BlobStore {
    bucket: Box<Bucket>,
    name: String,
}

impl S3BlobStore {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            name: bucket_name.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn container(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key, ttl_secs, None)
            .await
            .map_err(StorageError::S3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
