use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::dispatch::JobMessage;
use crate::store::job::{Job, JobStatus};
use crate::store::{JobStore, StaleCursor, StaleJob, StoreError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    job_type: String,
    payload: Vec<u8>,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(format!("job {}: {}", row.id, e)))?;

        Ok(Job {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// PostgreSQL-backed job store.
///
/// The pool is created once per process; every query checks a connection out
/// for its own duration and returns it on completion or error.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the process-wide pool from config and verify connectivity.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options())
            .await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_open_conns = config.max_open_conns,
            "Connected to Postgres"
        );

        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Work out why a conditional update touched no rows.
    async fn explain_missed_update(&self, id: Uuid, to: JobStatus) -> StoreError {
        let current: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => StoreError::NotFound(id),
            Ok(Some(status)) => match status.parse::<JobStatus>() {
                Ok(from) => StoreError::InvalidTransition { id, from, to },
                Err(e) => StoreError::Corrupt(format!("job {}: {}", id, e)),
            },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn transition(&self, id: Uuid, to: JobStatus) -> Result<(), StoreError> {
        let allowed: Vec<String> = to
            .allowed_sources()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let query = match to {
            JobStatus::Queued => {
                "UPDATE jobs SET status = $1, started_at = NULL, completed_at = NULL \
                 WHERE id = $2 AND status = ANY($3)"
            }
            JobStatus::Processing => {
                "UPDATE jobs SET status = $1, started_at = NOW() \
                 WHERE id = $2 AND status = ANY($3)"
            }
            JobStatus::Completed | JobStatus::Failed => {
                "UPDATE jobs SET status = $1, completed_at = NOW() \
                 WHERE id = $2 AND status = ANY($3)"
            }
        };

        let result = sqlx::query(query)
            .bind(to.as_str())
            .bind(id)
            .bind(&allowed)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(id, to).await);
        }

        tracing::debug!(job_id = %id, status = %to, "Job status updated");
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, type, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(JobStatus::Queued.as_str())
        .bind(job.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateId(job.id))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_job_by_id(&self, id: Uuid) -> Result<Job, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT id, type, payload, status, created_at, started_at, completed_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
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
        let rows: Vec<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, type, created_at
            FROM jobs
            WHERE status = $1
              AND created_at < $2
              AND ($3::timestamptz IS NULL OR (created_at, id) > ($3, $4::uuid))
            ORDER BY created_at ASC, id ASC
            LIMIT $5
            "#,
        )
        .bind(JobStatus::Queued.as_str())
        .bind(cutoff)
        .bind(after.map(|c| c.created_at))
        .bind(after.map(|c| c.id))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, job_type, created_at)| StaleJob {
                message: JobMessage::new(id, job_type),
                created_at,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
