use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

const QUEUE_KEY: &str = "report_forge:jobs";
const PROCESSING_KEY: &str = "report_forge:processing";

/// Fire-and-forget dispatch channel from ingress to the worker.
///
/// Messages carry only the job id; the payload lives in the job store.
/// Duplicate delivery is harmless because the store's conditional
/// transitions reject a second `PENDING -> PROCESSING` attempt.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn dequeue(&self) -> Result<Option<Uuid>, QueueError>;

    /// Acknowledge a delivered message.
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Number of pending dispatches.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), QueueError>;
}

/// Redis-backed dispatch queue (list push/pop with a processing holding
/// list so a crashed worker leaves its message visible).
pub struct RedisDispatchQueue {
    client: redis::Client,
}

impl RedisDispatchQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, job_id.to_string())
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Uuid>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job_id = Uuid::parse_str(&payload)
                    .map_err(|_| QueueError::Malformed(payload))?;
                Ok(Some(job_id))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, job_id.to_string())
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed queue payload: {0}")]
    Malformed(String),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
