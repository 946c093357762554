use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::enqueue::{Enqueuer, UNSPECIFIED_JOB_TYPE};
use crate::proto::queue_service_server::QueueService;
use crate::proto::{
    EnqueueJobRequest, EnqueueJobResponse, GetJobStatusRequest, GetJobStatusResponse,
    JobType as ProtoJobType,
};
use crate::store::{Job, StoreError};

/// gRPC front door: one method per RPC, all backed by a single [`Enqueuer`].
pub struct QueueHandler {
    enqueuer: Enqueuer,
}

impl QueueHandler {
    pub fn new(enqueuer: Enqueuer) -> Self {
        Self { enqueuer }
    }
}

#[tonic::async_trait]
impl QueueService for QueueHandler {
    async fn enqueue_job(
        &self,
        request: Request<EnqueueJobRequest>,
    ) -> Result<Response<EnqueueJobResponse>, Status> {
        let req = request.into_inner();
        let job_type = job_type_name(req.r#type);

        let job_id = self.enqueuer.submit(job_type, req.payload).await?;

        Ok(Response::new(EnqueueJobResponse {
            job_id: job_id.to_string(),
        }))
    }

    async fn get_job_status(
        &self,
        request: Request<GetJobStatusRequest>,
    ) -> Result<Response<GetJobStatusResponse>, Status> {
        let req = request.into_inner();

        let job_id =
            Uuid::parse_str(&req.job_id).map_err(|_| Status::invalid_argument("Invalid job ID"))?;

        match self.enqueuer.job_status(job_id).await {
            Ok(job) => Ok(Response::new(job_to_status_response(&job))),
            Err(StoreError::NotFound(_)) => Err(Status::not_found("Job not found")),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job status");
                Err(Status::internal("failed to get job status"))
            }
        }
    }
}

/// Queue name for a wire job type. Unknown values count as unspecified.
fn job_type_name(value: i32) -> &'static str {
    ProtoJobType::try_from(value)
        .map(|t| t.as_str_name())
        .unwrap_or(UNSPECIFIED_JOB_TYPE)
}

fn job_to_status_response(job: &Job) -> GetJobStatusResponse {
    GetJobStatusResponse {
        job_id: job.id.to_string(),
        r#type: job.job_type.clone(),
        status: job.status.to_string(),
        created_at_ms: job.created_at.timestamp_millis(),
        started_at_ms: job.started_at.map(|dt| dt.timestamp_millis()),
        completed_at_ms: job.completed_at.map(|dt| dt.timestamp_millis()),
    }
}
