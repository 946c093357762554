//! Per-type FIFO dispatch queues that hand job references to workers.
//!
//! A queue only ever carries a [`JobMessage`] (`{job_id, type}`), never the
//! payload; workers read the full record from the job store.
//!
//! - [`RedisDispatchQueue`]: one Redis list per job type (`RPUSH` / `BLPOP`)
//! - [`MemoryDispatchQueue`]: in-process lists for tests and local development
//!
//! Neither implementation retries internally; every I/O failure surfaces as a
//! [`QueueError`].

pub mod memory;
pub mod message;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use memory::MemoryDispatchQueue;
pub use message::JobMessage;
pub use redis_queue::RedisDispatchQueue;

pub const QUEUE_KEY_PREFIX: &str = "boltq:queue:";

/// Name of the list that holds messages for `job_type`.
pub fn queue_key(job_type: &str) -> String {
    format!("{}{}", QUEUE_KEY_PREFIX, job_type)
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("failed to encode or decode job message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unexpected reply from queue store: {0}")]
    Malformed(String),

    #[error("queue store did not answer within {0:?}")]
    Unresponsive(Duration),

    #[error("dequeue cancelled")]
    Cancelled,
}

impl From<bb8::RunError<redis::RedisError>> for QueueError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => QueueError::Redis(e),
            bb8::RunError::TimedOut => QueueError::PoolTimeout,
        }
    }
}

#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Append a reference to the tail of the `job_type` list.
    async fn enqueue(&self, job_id: Uuid, job_type: &str) -> Result<(), QueueError>;

    /// Pop from the head of the `job_type` list, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A zero timeout makes a
    /// single non-blocking attempt. Cancelling `cancel` ends the wait early
    /// with [`QueueError::Cancelled`].
    async fn dequeue(
        &self,
        job_type: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<JobMessage>, QueueError>;

    /// Current number of waiting messages. Observational only; it may be stale
    /// by the time the caller reads it.
    async fn queue_length(&self, job_type: &str) -> Result<u64, QueueError>;

    /// Whether a message for `job_id` is still waiting in the `job_type` list.
    async fn contains(&self, job_type: &str, job_id: Uuid) -> Result<bool, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}
