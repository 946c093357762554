use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::QueueError;

/// Lightweight reference to a job record, as carried on a dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
}

impl JobMessage {
    pub fn new(job_id: Uuid, job_type: impl Into<String>) -> Self {
        Self {
            job_id,
            job_type: job_type.into(),
        }
    }

    /// Wire form. Field order is fixed, so equal messages encode identically.
    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(data: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(data)?)
    }
}
