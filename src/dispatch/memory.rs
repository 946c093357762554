use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{DispatchQueue, JobMessage, QueueError};

#[derive(Debug, Default)]
struct TypedList {
    items: VecDeque<JobMessage>,
    ready: Arc<Notify>,
}

/// In-process dispatch queue with the same FIFO and blocking-pop semantics as
/// the Redis queue.
#[derive(Debug, Default)]
pub struct MemoryDispatchQueue {
    lists: Mutex<HashMap<String, TypedList>>,
}

impl MemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the head of a list. When it is empty and `wait` is set, hand back
    /// the list's wakeup handle instead.
    async fn try_pop(
        &self,
        job_type: &str,
        wait: bool,
    ) -> Result<JobMessage, Option<Arc<Notify>>> {
        let mut lists = self.lists.lock().await;

        if let Some(list) = lists.get_mut(job_type) {
            if let Some(msg) = list.items.pop_front() {
                // notify_one keeps a single permit, so pass the wakeup along while work remains
                if !list.items.is_empty() {
                    list.ready.notify_one();
                }
                let idle = list.items.is_empty() && Arc::strong_count(&list.ready) == 1;
                if idle {
                    lists.remove(job_type);
                }
                return Ok(msg);
            }
        }

        if wait {
            let list = lists.entry(job_type.to_string()).or_default();
            Err(Some(list.ready.clone()))
        } else {
            Self::prune(&mut lists, job_type);
            Err(None)
        }
    }

    /// Drop an empty list that nobody is waiting on.
    fn prune(lists: &mut HashMap<String, TypedList>, job_type: &str) {
        let idle = lists
            .get(job_type)
            .is_some_and(|l| l.items.is_empty() && Arc::strong_count(&l.ready) == 1);
        if idle {
            lists.remove(job_type);
        }
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn enqueue(&self, job_id: Uuid, job_type: &str) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().await;
        let list = lists.entry(job_type.to_string()).or_default();
        list.items.push_back(JobMessage::new(job_id, job_type));
        list.ready.notify_one();
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
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(far_future);

        loop {
            let wait = Instant::now() < deadline;
            let ready = match self.try_pop(job_type, wait).await {
                Ok(msg) => return Ok(Some(msg)),
                Err(Some(ready)) => ready,
                Err(None) => return Ok(None),
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(QueueError::Cancelled),
                woke = tokio::time::timeout_at(deadline, ready.notified()) => Ok(woke.is_ok()),
            };
            drop(ready);

            match outcome {
                Ok(true) => continue,
                Ok(false) => return Ok(self.try_pop(job_type, false).await.ok()),
                Err(e) => {
                    Self::prune(&mut *self.lists.lock().await, job_type);
                    return Err(e);
                }
            }
        }
    }

    async fn queue_length(&self, job_type: &str) -> Result<u64, QueueError> {
        let lists = self.lists.lock().await;
        Ok(lists.get(job_type).map_or(0, |l| l.items.len() as u64))
    }

    async fn contains(&self, job_type: &str, job_id: Uuid) -> Result<bool, QueueError> {
        let lists = self.lists.lock().await;
        Ok(lists
            .get(job_type)
            .is_some_and(|l| l.items.iter().any(|m| m.job_id == job_id)))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// A deadline no caller will reach, for timeouts too large to add to `now`.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_timeout_does_not_wait() {
        let queue = MemoryDispatchQueue::new();
        let cancel = CancellationToken::new();

        let start = std::time::Instant::now();
        let msg = queue
            .dequeue("JOB_STANDARD", Duration::ZERO, &cancel)
            .await
            .unwrap();
        assert!(msg.is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn contains_tracks_live_messages() {
        let queue = MemoryDispatchQueue::new();
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        assert!(!queue.contains("A", id).await.unwrap());
        queue.enqueue(id, "A").await.unwrap();
        assert!(queue.contains("A", id).await.unwrap());
        assert!(!queue.contains("B", id).await.unwrap());

        queue.dequeue("A", Duration::ZERO, &cancel).await.unwrap();
        assert!(!queue.contains("A", id).await.unwrap());
    }

    #[tokio::test]
    async fn huge_timeout_waits_instead_of_overflowing() {
        let queue = Arc::new(MemoryDispatchQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue("A", Duration::MAX, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = Uuid::new_v4();
        queue.enqueue(id, "A").await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake up")
            .unwrap()
            .unwrap();
        assert_eq!(msg.map(|m| m.job_id), Some(id));
    }

    #[tokio::test]
    async fn drained_lists_are_released() {
        let queue = MemoryDispatchQueue::new();
        let cancel = CancellationToken::new();

        queue.enqueue(Uuid::new_v4(), "A").await.unwrap();
        queue.dequeue("A", Duration::ZERO, &cancel).await.unwrap();
        queue.dequeue("B", Duration::ZERO, &cancel).await.unwrap();
        queue
            .dequeue("C", Duration::from_millis(20), &cancel)
            .await
            .unwrap();

        let waiter = CancellationToken::new();
        waiter.cancel();
        let _ = queue.dequeue("D", Duration::from_secs(1), &waiter).await;

        assert!(queue.lists.lock().await.is_empty());
        assert_eq!(queue.queue_length("A").await.unwrap(), 0);
    }
}
