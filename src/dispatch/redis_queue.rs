use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::dispatch::{queue_key, DispatchQueue, JobMessage, QueueError};

/// Redis treats a zero BLPOP timeout as "block forever", so never send less.
const MIN_BLOCK: Duration = Duration::from_millis(10);

/// Longest single BLPOP; longer waits are split into several.
const MAX_BLOCK: Duration = Duration::from_secs(60 * 60);

/// Extra time allowed for the server to answer a BLPOP after its own timeout.
const REPLY_GRACE: Duration = Duration::from_secs(2);

/// How long the next BLPOP may block. `None` means the deadline is too far
/// away to represent.
fn next_block(deadline: Option<Instant>, now: Instant) -> Duration {
    deadline
        .map_or(MAX_BLOCK, |d| d.saturating_duration_since(now))
        .clamp(MIN_BLOCK, MAX_BLOCK)
}

/// Dispatch queue backed by one Redis list per job type.
///
/// Short commands borrow a connection from a bounded bb8 pool for the length
/// of the call. A blocking pop holds its connection for the whole wait, so it
/// opens a dedicated one instead; dropping it on cancellation also tears down
/// the server-side wait.
#[derive(Clone)]
pub struct RedisDispatchQueue {
    client: redis::Client,
    pool: Pool<RedisConnectionManager>,
}

impl RedisDispatchQueue {
    pub fn new(client: redis::Client, pool: Pool<RedisConnectionManager>) -> Self {
        Self { client, pool }
    }

    /// Build the process-wide pool from config and verify connectivity.
    pub async fn connect(config: &RedisConfig) -> crate::error::Result<Self> {
        let info = config.connection_info()?;

        let manager = RedisConnectionManager::new(info.clone()).map_err(QueueError::from)?;
        let pool = Pool::builder()
            .max_size(config.pool_max_size)
            .min_idle(Some(config.pool_min_idle))
            .max_lifetime(Some(config.conn_max_lifetime))
            .idle_timeout(Some(config.conn_max_idle_time))
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(QueueError::from)?;
        let client = redis::Client::open(info).map_err(QueueError::from)?;

        let queue = Self { client, pool };
        queue.ping().await?;

        tracing::info!(
            addr = %config.addr,
            db = config.db,
            pool_max_size = config.pool_max_size,
            "Connected to Redis"
        );

        Ok(queue)
    }

    /// Release this handle on the pool. Pooled connections close once the
    /// last clone is gone.
    pub fn close(self) {
        let state = self.pool.state();
        tracing::info!(
            connections = state.connections,
            idle = state.idle_connections,
            "Closing Redis pool"
        );
    }

    async fn blocking_pop(
        conn: &mut MultiplexedConnection,
        key: &str,
        block: Duration,
    ) -> Result<Option<String>, QueueError> {
        let seconds = block.as_millis() as f64 / 1000.0;

        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(seconds)
            .query_async(conn)
            .await?;

        Ok(reply.map(|(_, payload)| payload))
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn enqueue(&self, job_id: Uuid, job_type: &str) -> Result<(), QueueError> {
        let data = JobMessage::new(job_id, job_type).encode()?;
        let key = queue_key(job_type);

        let mut conn = self.pool.get().await?;
        let _len: i64 = redis::cmd("RPUSH")
            .arg(&key)
            .arg(data)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn dequeue(
        &self,
        job_type: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<JobMessage>, QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        let key = queue_key(job_type);

        let payload = if timeout.is_zero() {
            let mut conn = self.pool.get().await?;
            let popped: Option<String> = redis::cmd("LPOP")
                .arg(&key)
                .query_async(&mut *conn)
                .await?;
            popped
        } else {
            let deadline = Instant::now().checked_add(timeout);
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            loop {
                let block = next_block(deadline, Instant::now());
                let limit = block + REPLY_GRACE;

                let popped = tokio::select! {
                    _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                    reply = tokio::time::timeout(limit, Self::blocking_pop(&mut conn, &key, block)) => {
                        reply.map_err(|_| QueueError::Unresponsive(limit))??
                    }
                };

                let expired = deadline.is_some_and(|d| Instant::now() >= d);
                if popped.is_some() || expired {
                    break popped;
                }
            }
        };

        match payload {
            Some(data) => {
                let msg = JobMessage::decode(&data)?;
                tracing::debug!(job_id = %msg.job_id, job_type, "Job dequeued");
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    async fn queue_length(&self, job_type: &str) -> Result<u64, QueueError> {
        let mut conn = self.pool.get().await?;
        let len: i64 = redis::cmd("LLEN")
            .arg(queue_key(job_type))
            .query_async(&mut *conn)
            .await?;
        u64::try_from(len).map_err(|_| QueueError::Malformed(format!("LLEN returned {}", len)))
    }

    async fn contains(&self, job_type: &str, job_id: Uuid) -> Result<bool, QueueError> {
        let element = JobMessage::new(job_id, job_type).encode()?;

        let mut conn = self.pool.get().await?;
        let position: Option<i64> = redis::cmd("LPOS")
            .arg(queue_key(job_type))
            .arg(element)
            .query_async(&mut *conn)
            .await?;
        Ok(position.is_some())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        if pong != "PONG" {
            return Err(QueueError::Malformed(format!("PING returned {}", pong)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_block_follows_remaining_time() {
        let now = Instant::now();
        assert_eq!(
            next_block(Some(now + Duration::from_secs(5)), now),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn next_block_never_sends_zero() {
        let now = Instant::now();
        assert_eq!(next_block(Some(now), now), MIN_BLOCK);
        assert_eq!(next_block(Some(now), now + Duration::from_secs(1)), MIN_BLOCK);
    }

    #[test]
    fn next_block_caps_unbounded_waits() {
        let now = Instant::now();
        assert_eq!(now.checked_add(Duration::MAX), None);
        assert_eq!(next_block(None, now), MAX_BLOCK);
        assert_eq!(
            next_block(Some(now + Duration::from_secs(86400)), now),
            MAX_BLOCK
        );
    }
}
