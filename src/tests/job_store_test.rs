//! Job store tests: lock discipline, batch commit invariants and resume
//! queries.

use crate::models::{JobStatus, LeadRecord, LeadResult, ProcessingStatus};
use crate::services::job_store::JobStoreError;
use crate::tests::common::create_job_store;

fn result_row(job_id: &str, row_index: i64, batch_index: i64, success: bool) -> LeadResult {
    let record = LeadRecord {
        row_index,
        director_name: format!("Name {}", row_index),
        extra_fields: Default::default(),
    };
    let classification = if success {
        crate::models::Classification::resolved(
            &record.director_name,
            &record.director_name,
            crate::models::Category::African,
            0.9,
            crate::models::Method::Rule,
        )
    } else {
        crate::models::Classification::failed(
            &record.director_name,
            crate::models::ErrorKind::EmptyName,
            "empty",
        )
    };
    let status = if success { ProcessingStatus::Success } else { ProcessingStatus::Failed };
    LeadResult::from_classification(job_id, batch_index, &record, &classification, status, 0)
}

#[tokio::test]
async fn begin_commit_finish_roundtrip() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "output.csv", 10).await.unwrap();

    let batch: Vec<LeadResult> = (0..10).map(|i| result_row(&job_id, i, 0, i % 5 != 0)).collect();
    store.commit_batch(&job_id, 0, &batch).await.unwrap();

    let job = store.get_job(&job_id).await.unwrap();
    assert_eq!(job.last_committed_batch, 0);
    assert_eq!(job.processed_count, 8);
    assert_eq!(job.failed_count, 2);

    store.finish_job(&job_id, JobStatus::Completed, Some(10), None).await.unwrap();
    let job = store.get_job(&job_id).await.unwrap();
    assert_eq!(job.status_enum(), JobStatus::Completed);
    assert_eq!(job.total_rows, Some(10));
    // Committed rows always reconcile with the counters
    assert_eq!(job.processed_count + job.failed_count, 10);
}

#[tokio::test]
async fn second_job_on_same_input_is_rejected() {
    let store = create_job_store().await;
    let first = store.begin_job("input.csv", "100:1", "out_a.csv", 10).await.unwrap();

    let err = store.begin_job("input.csv", "100:1", "out_b.csv", 10).await.unwrap_err();
    match err {
        JobStoreError::ConcurrentJob { job_id, .. } => assert_eq!(job_id, first),
        other => panic!("expected ConcurrentJob, got {}", other),
    }
}

#[tokio::test]
async fn changed_fingerprint_is_rejected_for_same_output() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 10).await.unwrap();
    // Simulates a crash: lock released, job still pending
    store.finish_job(&job_id, JobStatus::Paused, None, None).await.unwrap();

    let err = store.begin_job("input.csv", "200:2", "out.csv", 10).await.unwrap_err();
    assert!(matches!(err, JobStoreError::InputChanged { .. }));

    // A fresh output path overrides the refusal
    store.begin_job("input.csv", "200:2", "out_v2.csv", 10).await.unwrap();
}

#[tokio::test]
async fn out_of_order_commits_are_refused() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();

    let batch: Vec<LeadResult> = (0..5).map(|i| result_row(&job_id, i, 0, true)).collect();
    store.commit_batch(&job_id, 0, &batch).await.unwrap();

    let skipped: Vec<LeadResult> = (10..15).map(|i| result_row(&job_id, i, 2, true)).collect();
    let err = store.commit_batch(&job_id, 2, &skipped).await.unwrap_err();
    assert!(matches!(err, JobStoreError::OutOfOrderCommit { expected: 1, got: 2 }));
}

#[tokio::test]
async fn duplicate_row_indices_are_refused() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();

    let batch: Vec<LeadResult> = (0..5).map(|i| result_row(&job_id, i, 0, true)).collect();
    store.commit_batch(&job_id, 0, &batch).await.unwrap();

    // Batch 1 re-uses row index 4: primary key violation
    let overlapping: Vec<LeadResult> = (4..8).map(|i| result_row(&job_id, i, 1, true)).collect();
    assert!(store.commit_batch(&job_id, 1, &overlapping).await.is_err());

    // The failed batch must not have advanced anything
    let job = store.get_job(&job_id).await.unwrap();
    assert_eq!(job.last_committed_batch, 0);
    assert_eq!(job.processed_count, 5);
}

#[tokio::test]
async fn resume_finds_pending_job_with_matching_fingerprint() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();
    let batch: Vec<LeadResult> = (0..5).map(|i| result_row(&job_id, i, 0, true)).collect();
    store.commit_batch(&job_id, 0, &batch).await.unwrap();
    store.finish_job(&job_id, JobStatus::Paused, None, None).await.unwrap();

    let resumed = store.resume_job("input.csv", "100:1").await.unwrap().expect("resumable job");
    assert_eq!(resumed.job_id, job_id);
    assert_eq!(resumed.last_committed_batch, 0);
    assert_eq!(resumed.processed_count, 5);
    assert_eq!(resumed.resume_count, 1);
    assert_eq!(resumed.status_enum(), JobStatus::Running);

    // A different fingerprint never resumes
    assert!(store.resume_job("input.csv", "999:9").await.unwrap().is_none());
}

#[tokio::test]
async fn completed_jobs_do_not_resume() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();
    store.finish_job(&job_id, JobStatus::Completed, Some(0), None).await.unwrap();

    assert!(store.resume_job("input.csv", "100:1").await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_marks_job_paused_and_blocks_commits() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();

    store.cancel_job(&job_id).await.unwrap();
    let job = store.get_job(&job_id).await.unwrap();
    assert_eq!(job.status_enum(), JobStatus::Paused);

    let batch: Vec<LeadResult> = (0..5).map(|i| result_row(&job_id, i, 0, true)).collect();
    let err = store.commit_batch(&job_id, 0, &batch).await.unwrap_err();
    assert!(matches!(err, JobStoreError::JobNotRunning(_)));

    // The lock is gone, so a new run can start
    store.begin_job("other.csv", "1:1", "o.csv", 5).await.unwrap();
}

#[tokio::test]
async fn stale_locks_for_finished_jobs_are_released() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 5).await.unwrap();

    // Mark the job failed directly, leaving the lock row behind
    sqlx::query("UPDATE job_executions SET status = 'failed' WHERE job_id = ?")
        .bind(&job_id)
        .execute(store.pool())
        .await
        .unwrap();

    let released = store.release_stale_locks(3600).await.unwrap();
    assert_eq!(released, 1);

    store.begin_job("input.csv", "100:1", "out2.csv", 5).await.unwrap();
}

#[tokio::test]
async fn summary_aggregates_methods_and_errors() {
    let store = create_job_store().await;
    let job_id = store.begin_job("input.csv", "100:1", "out.csv", 4).await.unwrap();

    let batch: Vec<LeadResult> = (0..4).map(|i| result_row(&job_id, i, 0, i != 3)).collect();
    store.commit_batch(&job_id, 0, &batch).await.unwrap();
    store.finish_job(&job_id, JobStatus::Completed, Some(4), None).await.unwrap();

    let summary = store.summary(&job_id).await.unwrap();
    assert_eq!(summary.processed_count, 3);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.method_counts.get("rule"), Some(&3));
    assert_eq!(summary.error_counts.get("input.empty_name"), Some(&1));
    assert_eq!(summary.committed_rows(), 4);
}
