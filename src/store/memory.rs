use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dispatch::JobMessage;
use crate::store::job::{Job, JobStatus};
use crate::store::{JobStore, StaleCursor, StaleJob, StoreError};

/// In-process job store with the same transition rules as the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all jobs sorted chronologically by creation time
    pub async fn all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn transition(&self, id: Uuid, to: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !job.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        let now = Utc::now();
        job.status = to;
        match to {
            JobStatus::Queued => {
                job.started_at = None;
                job.completed_at = None;
            }
            JobStatus::Processing => job.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => job.completed_at = Some(now),
        }

        tracing::debug!(job_id = %id, status = %to, "Job status updated");
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateId(job.id));
        }
        let mut record = job.clone();
        record.status = JobStatus::Queued;
        jobs.insert(job.id, record);
        Ok(())
    }

    async fn get_job_by_id(&self, id: Uuid) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn mark_as_queued(&self, id: Uuid) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Queued).await
    }

    async fn mark_as_processing(&self, id: Uuid) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Processing).await
    }

    async fn mark_as_completed(&self, id: Uuid) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Completed).await
    }

    async fn mark_as_failed(&self, id: Uuid) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Failed).await
    }

    async fn list_stale_queued(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<StaleCursor>,
        limit: usize,
    ) -> Result<Vec<StaleJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<StaleJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.created_at < cutoff)
            .map(|j| StaleJob {
                message: JobMessage::new(j.id, j.job_type.clone()),
                created_at: j.created_at,
            })
            .filter(|s| after.map_or(true, |c| s.cursor() > c))
            .collect();
        stale.sort_by_key(StaleJob::cursor);
        stale.truncate(limit);

        Ok(stale)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
