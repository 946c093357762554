//! Tests for the QueueService handler, called directly without a transport.


use tonic::{Code, Request};
use uuid::Uuid;

use boltq::grpc::QueueHandler;
use boltq::proto::queue_service_server::QueueService;
use boltq::proto::{EnqueueJobRequest, GetJobStatusRequest, JobType};
use boltq::store::{JobStatus, JobStore};
use test_harness::TestBackends;

fn handler(b: &TestBackends) -> QueueHandler {
    QueueHandler::new(b.enqueuer.clone())
}

#[tokio::test]
async fn test_enqueue_returns_job_id() {
    let b = TestBackends::new();
    let service = handler(&b);

    let response = service
        .enqueue_job(Request::new(EnqueueJobRequest {
            r#type: JobType::JobBatch as i32,
            payload: b"{\"rows\":100}".to_vec(),
        }))
        .await
        .unwrap()
        .into_inner();

    let job_id = Uuid::parse_str(&response.job_id).expect("canonical uuid");
    let job = b.store.get_job_by_id(job_id).await.unwrap();
    assert_eq!(job.job_type, "JOB_BATCH");
    assert_eq!(job.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_enqueue_rejects_unspecified_and_unknown_types() {
    let b = TestBackends::new();
    let service = handler(&b);

    for raw in [JobType::Unspecified as i32, 42] {
        let status = service
            .enqueue_job(Request::new(EnqueueJobRequest {
                r#type: raw,
                payload: b"test payload".to_vec(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(status.message().contains("invalid job type"));
    }

    assert!(b.store.inner.is_empty().await);
}

#[tokio::test]
async fn test_enqueue_publish_failure_is_internal() {
    let b = TestBackends::new();
    b.queue.set_fail_enqueue(true);

    let status = handler(&b)
        .enqueue_job(Request::new(EnqueueJobRequest {
            r#type: JobType::JobStandard as i32,
            payload: b"payload".to_vec(),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "failed to enqueue job");
}

#[tokio::test]
async fn test_status_reports_lifecycle() {
    let b = TestBackends::new();
    let service = handler(&b);
    let job_id = b
        .enqueuer
        .submit("JOB_STANDARD", b"payload".to_vec())
        .await
        .unwrap();

    let queued = service
        .get_job_status(Request::new(GetJobStatusRequest {
            job_id: job_id.to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(queued.job_id, job_id.to_string());
    assert_eq!(queued.r#type, "JOB_STANDARD");
    assert_eq!(queued.status, "queued");
    assert!(queued.created_at_ms > 0);
    assert!(queued.started_at_ms.is_none());
    assert!(queued.completed_at_ms.is_none());

    b.store.mark_as_processing(job_id).await.unwrap();
    b.store.mark_as_completed(job_id).await.unwrap();

    let done = service
        .get_job_status(Request::new(GetJobStatusRequest {
            job_id: job_id.to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(done.status, "completed");
    let started = done.started_at_ms.expect("started_at_ms set");
    let completed = done.completed_at_ms.expect("completed_at_ms set");
    assert!(started >= done.created_at_ms);
    assert!(completed >= started);
}

#[tokio::test]
async fn test_status_error_codes() {
    let b = TestBackends::new();
    let service = handler(&b);

    let malformed = service
        .get_job_status(Request::new(GetJobStatusRequest {
            job_id: "not-a-uuid".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(malformed.code(), Code::InvalidArgument);
    assert_eq!(malformed.message(), "Invalid job ID");

    let missing = service
        .get_job_status(Request::new(GetJobStatusRequest {
            job_id: Uuid::new_v4().to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);
    assert_eq!(missing.message(), "Job not found");
}
