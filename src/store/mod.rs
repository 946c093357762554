//! Durable job records, the source of truth for every submitted job.
//!
//! - [`PostgresJobStore`]: production store backed by a sqlx `PgPool`
//! - [`MemoryJobStore`]: in-process store for tests and local development
//!
//! Status transitions are conditional writes keyed by the current status, so a
//! retried or duplicated worker call can never overwrite a newer state.

pub mod job;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dispatch::JobMessage;

pub use job::{Job, JobStatus};
pub use memory::MemoryJobStore;
pub use postgres::PostgresJobStore;

/// Position in the `(created_at, id)` ordering of stale queued jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StaleCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

/// A queued job old enough to be checked by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleJob {
    pub message: JobMessage,
    pub created_at: DateTime<Utc>,
}

impl StaleJob {
    pub fn cursor(&self) -> StaleCursor {
        StaleCursor {
            created_at: self.created_at,
            id: self.message.job_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    DuplicateId(Uuid),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("corrupt job record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::DuplicateId`] if the id exists.
    async fn create_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job_by_id(&self, id: Uuid) -> Result<Job, StoreError>;

    /// Reset a job to `queued` and clear its execution timestamps.
    async fn mark_as_queued(&self, id: Uuid) -> Result<(), StoreError>;

    /// `queued -> processing`, stamping `started_at`.
    async fn mark_as_processing(&self, id: Uuid) -> Result<(), StoreError>;

    /// `processing -> completed`, stamping `completed_at`.
    async fn mark_as_completed(&self, id: Uuid) -> Result<(), StoreError>;

    /// `processing | queued -> failed`, stamping `completed_at`.
    async fn mark_as_failed(&self, id: Uuid) -> Result<(), StoreError>;

    /// Queued jobs created before `cutoff`, ordered by `(created_at, id)`.
    ///
    /// Returns at most `limit` entries strictly after `after`; pass the
    /// cursor of the last entry to fetch the next page.
    async fn list_stale_queued(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<StaleCursor>,
        limit: usize,
    ) -> Result<Vec<StaleJob>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
