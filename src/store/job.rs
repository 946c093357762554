use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a job record.
///
/// `Queued -> Processing -> {Completed, Failed}`. `Queued` is reachable again
/// only through an explicit requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Statuses a job may be in for a transition to `self` to be accepted.
    pub fn allowed_sources(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
            ],
            JobStatus::Processing => &[JobStatus::Queued],
            JobStatus::Completed => &[JobStatus::Processing],
            // Failing a queued job covers jobs rejected before execution starts
            JobStatus::Failed => &[JobStatus::Processing, JobStatus::Queued],
        }
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        to.allowed_sources().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Durable job record. The payload is opaque to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: Vec<u8>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job with a fresh id.
    pub fn new(job_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4(), job_type, payload, Utc::now())
    }

    pub fn with_id(
        id: Uuid,
        job_type: impl Into<String>,
        payload: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued_without_timestamps() {
        let job = Job::new("JOB_STANDARD", b"hello".to_vec());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.job_type, "JOB_STANDARD");
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn transitions_follow_lifecycle() {
        use JobStatus::*;

        assert!(Queued.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Processing));

        assert!(Processing.can_transition_to(Completed));
        assert!(!Queued.can_transition_to(Completed));

        assert!(Processing.can_transition_to(Failed));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));

        for from in [Queued, Processing, Completed, Failed] {
            assert!(from.can_transition_to(Queued));
        }
    }

    #[test]
    fn job_serializes_type_field() {
        let job = Job::new("JOB_BATCH", vec![1]);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "JOB_BATCH");
        assert_eq!(value["status"], "queued");
    }
}
