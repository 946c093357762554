//! The enqueue path: validate, record, publish.
//!
//! A submission is written to the job store first and only then published to
//! the dispatch queue, so a worker can never pop a reference to a record that
//! does not exist. The two writes share no transaction. If publishing fails
//! the record stays `queued` with no live message; the [`Reconciler`] finds
//! such records and publishes them again.

pub mod reconcile;
pub mod validate;

use std::sync::Arc;

use chrono::Utc;
use tonic::Status;
use uuid::Uuid;

use crate::dispatch::{DispatchQueue, QueueError};
use crate::store::{Job, JobStore, StoreError};

pub use reconcile::{Reconciler, SweepReport};
pub use validate::{validate_submission, ValidationError, MAX_PAYLOAD_SIZE, UNSPECIFIED_JOB_TYPE};

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to create job record: {0}")]
    Store(#[source] StoreError),

    #[error("job {job_id} recorded but not published: {source}")]
    Publish {
        job_id: Uuid,
        #[source]
        source: QueueError,
    },
}

impl From<EnqueueError> for Status {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Invalid(e) => Status::invalid_argument(e.to_string()),
            EnqueueError::Store(_) | EnqueueError::Publish { .. } => {
                Status::internal("failed to enqueue job")
            }
        }
    }
}

/// Orchestrates submissions across the job store and the dispatch queue.
#[derive(Clone)]
pub struct Enqueuer {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
}

impl Enqueuer {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn DispatchQueue>) -> Self {
        Self { store, queue }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn DispatchQueue> {
        &self.queue
    }

    /// Validate, record and publish a job. Returns the new job id.
    pub async fn submit(&self, job_type: &str, payload: Vec<u8>) -> Result<Uuid, EnqueueError> {
        validate_submission(job_type, &payload)?;

        tracing::info!(job_type, payload_size = payload.len(), "Received job submission");

        let job = Job::with_id(Uuid::new_v4(), job_type, payload, Utc::now());
        let job_id = job.id;

        if let Err(e) = self.store.create_job(&job).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to create job in store");
            return Err(EnqueueError::Store(e));
        }

        if let Err(e) = self.queue.enqueue(job_id, job_type).await {
            // The record is durable and queued; the reconciler will republish it
            tracing::error!(
                job_id = %job_id,
                job_type,
                error = %e,
                "Job recorded but publish failed, awaiting reconciliation"
            );
            return Err(EnqueueError::Publish { job_id, source: e });
        }

        tracing::info!(job_id = %job_id, job_type, "Job enqueued successfully");
        Ok(job_id)
    }

    /// Current record for a job.
    pub async fn job_status(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.store.get_job_by_id(job_id).await
    }
}
