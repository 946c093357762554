/// Largest accepted payload, in bytes (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Job type sentinel meaning "not set".
pub const UNSPECIFIED_JOB_TYPE: &str = "JOB_TYPE_UNSPECIFIED";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid job type")]
    InvalidJobType,

    #[error("payload cannot be empty")]
    EmptyPayload,

    #[error("payload size exceeds maximum limit: {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Check a submission before anything is written.
pub fn validate_submission(job_type: &str, payload: &[u8]) -> Result<(), ValidationError> {
    if job_type.is_empty() || job_type == UNSPECIFIED_JOB_TYPE {
        tracing::warn!(job_type, "Invalid job type");
        return Err(ValidationError::InvalidJobType);
    }

    if payload.is_empty() {
        tracing::warn!(job_type, "Payload is empty");
        return Err(ValidationError::EmptyPayload);
    }

    if payload.len() > MAX_PAYLOAD_SIZE {
        tracing::warn!(job_type, size = payload.len(), "Payload size exceeds maximum limit");
        return Err(ValidationError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    Ok(())
}
