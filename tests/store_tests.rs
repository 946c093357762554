//! Job record lifecycle against the in-process store.

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use boltq::store::{Job, JobStatus, JobStore, MemoryJobStore, StoreError};

fn standard_job() -> Job {
    Job::new("JOB_STANDARD", b"payload".to_vec())
}

#[tokio::test]
async fn test_full_lifecycle_stamps_timestamps() {
    let store = MemoryJobStore::new();
    let job = standard_job();
    store.create_job(&job).await.unwrap();

    let stored = store.get_job_by_id(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.created_at, job.created_at);
    assert!(stored.started_at.is_none());

    store.mark_as_processing(job.id).await.unwrap();
    let processing = store.get_job_by_id(job.id).await.unwrap();
    assert_eq!(processing.status, JobStatus::Processing);
    let started = processing.started_at.expect("started_at set");
    assert!(started >= processing.created_at);
    assert!(processing.completed_at.is_none());

    store.mark_as_completed(job.id).await.unwrap();
    let done = store.get_job_by_id(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.started_at, Some(started));
    assert!(done.completed_at.unwrap() >= started);
}

#[tokio::test]
async fn test_completed_requires_processing() {
    let store = MemoryJobStore::new();
    let job = standard_job();
    store.create_job(&job).await.unwrap();

    let err = store.mark_as_completed(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: JobStatus::Queued,
            to: JobStatus::Completed,
            ..
        }
    ));

    let unchanged = store.get_job_by_id(job.id).await.unwrap();
    assert_eq!(unchanged.status, JobStatus::Queued);
    assert!(unchanged.completed_at.is_none());
}

#[tokio::test]
async fn test_second_processing_claim_loses() {
    let store = MemoryJobStore::new();
    let job = standard_job();
    store.create_job(&job).await.unwrap();

    store.mark_as_processing(job.id).await.unwrap();
    let first_started = store.get_job_by_id(job.id).await.unwrap().started_at;

    let err = store.mark_as_processing(job.id).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert_eq!(
        store.get_job_by_id(job.id).await.unwrap().started_at,
        first_started
    );
}

#[tokio::test]
async fn test_failed_from_queued_and_processing() {
    let store = MemoryJobStore::new();

    let never_started = standard_job();
    store.create_job(&never_started).await.unwrap();
    store.mark_as_failed(never_started.id).await.unwrap();
    let failed = store.get_job_by_id(never_started.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.started_at.is_none());
    assert!(failed.completed_at.is_some());

    let started = standard_job();
    store.create_job(&started).await.unwrap();
    store.mark_as_processing(started.id).await.unwrap();
    store.mark_as_failed(started.id).await.unwrap();
    assert_eq!(
        store.get_job_by_id(started.id).await.unwrap().status,
        JobStatus::Failed
    );

    // Terminal states do not fail again
    assert!(store.mark_as_failed(started.id).await.is_err());
}

#[tokio::test]
async fn test_requeue_clears_execution_timestamps() {
    let store = MemoryJobStore::new();
    let job = standard_job();
    store.create_job(&job).await.unwrap();
    store.mark_as_processing(job.id).await.unwrap();
    store.mark_as_failed(job.id).await.unwrap();

    store.mark_as_queued(job.id).await.unwrap();
    let requeued = store.get_job_by_id(job.id).await.unwrap();
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(requeued.started_at.is_none());
    assert!(requeued.completed_at.is_none());
    assert_eq!(requeued.created_at, job.created_at);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let store = MemoryJobStore::new();
    let id = Uuid::new_v4();

    assert!(matches!(
        store.get_job_by_id(id).await,
        Err(StoreError::NotFound(missing)) if missing == id
    ));
    assert!(matches!(
        store.mark_as_processing(id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.mark_as_queued(id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_stale_scan_skips_recent_and_claimed() {
    let store = MemoryJobStore::new();
    let now = Utc::now();

    let old = Job::with_id(
        Uuid::new_v4(),
        "JOB_STANDARD",
        b"a".to_vec(),
        now - ChronoDuration::minutes(10),
    );
    let old_claimed = Job::with_id(
        Uuid::new_v4(),
        "JOB_BATCH",
        b"b".to_vec(),
        now - ChronoDuration::minutes(9),
    );
    let fresh = Job::with_id(Uuid::new_v4(), "JOB_STANDARD", b"c".to_vec(), now);

    for job in [&old, &old_claimed, &fresh] {
        store.create_job(job).await.unwrap();
    }
    store.mark_as_processing(old_claimed.id).await.unwrap();

    let stale = store
        .list_stale_queued(now - ChronoDuration::minutes(1), None, 10)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].message.job_id, old.id);
    assert_eq!(stale[0].message.job_type, "JOB_STANDARD");
    assert_eq!(stale[0].created_at, old.created_at);

    let after = store
        .list_stale_queued(now - ChronoDuration::minutes(1), Some(stale[0].cursor()), 10)
        .await
        .unwrap();
    assert!(after.is_empty());
}
