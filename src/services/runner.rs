//! Batch runner.
//!
//! Streams the input spreadsheet in bounded batches, classifies rows
//! through the orchestrator and commits each finished batch to the job
//! store. Interruptions at any point lose at most the uncommitted batch;
//! resume skips the committed row count and re-reads the rest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::config::RunnerConfig;
use crate::models::{
    Classification, ErrorKind, JobStatus, JobSummary, LeadRecord, LeadResult, ProcessingStatus,
};
use crate::services::classifier::{ClassifierOrchestrator, LocalDecision};
use crate::services::job_store::{self, JobStore, JobStoreError};
use crate::services::spreadsheet::{LeadReader, RowRead, SpreadsheetError};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Input column carrying the name to classify.
    pub name_column: String,
}

impl RunOptions {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            name_column: "DirectorName".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error("input io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One slot of an in-memory batch before classification.
enum BatchEntry {
    Record(LeadRecord),
    Malformed { row_index: i64, message: String },
}

pub struct BatchRunner {
    orchestrator: Arc<ClassifierOrchestrator>,
    job_store: Arc<JobStore>,
    config: RunnerConfig,
    parallelism: usize,
    shutdown: watch::Receiver<bool>,
}

impl BatchRunner {
    pub fn new(
        orchestrator: Arc<ClassifierOrchestrator>,
        job_store: Arc<JobStore>,
        config: RunnerConfig,
        parallelism: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { orchestrator, job_store, config, parallelism: parallelism.max(1), shutdown }
    }

    fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run (or resume) a job over one input file to completion.
    pub async fn run(&self, options: &RunOptions) -> Result<JobSummary, RunnerError> {
        let input_path = options.input_path.to_string_lossy().to_string();
        let output_path = options.output_path.to_string_lossy().to_string();

        let released = self.job_store.release_stale_locks(self.config.stale_lock_age_secs).await?;
        if released > 0 {
            tracing::info!("Released {} stale lock(s) before starting", released);
        }

        let fingerprint = job_store::input_fingerprint(&options.input_path)?;

        let (job_id, mut next_batch, mut committed_rows) =
            match self.job_store.resume_job(&input_path, &fingerprint).await? {
                Some(job) => {
                    let committed = job.processed_count + job.failed_count;
                    tracing::info!(
                        "Resuming job {} on '{}' from batch {} ({} rows already committed)",
                        job.job_id,
                        input_path,
                        job.last_committed_batch + 1,
                        committed
                    );
                    (job.job_id, job.last_committed_batch + 1, committed)
                },
                None => {
                    let job_id = self
                        .job_store
                        .begin_job(&input_path, &fingerprint, &output_path, self.config.batch_size)
                        .await?;
                    tracing::info!("Started new job {} on '{}'", job_id, input_path);
                    (job_id, 0, 0)
                },
            };

        let mut reader = LeadReader::open(&options.input_path, &options.name_column)?;

        // Skip rows already inside committed batches. The count, not a
        // recomputed batch offset, so batch-size changes between runs are
        // harmless.
        let mut skipped = 0i64;
        while skipped < committed_rows {
            match reader.next_row()? {
                Some(_) => skipped += 1,
                None => break,
            }
        }
        if skipped < committed_rows {
            tracing::warn!(
                "Input '{}' has fewer rows ({}) than previously committed ({})",
                input_path,
                skipped,
                committed_rows
            );
        }

        loop {
            if self.cancelled() {
                return self.pause(&job_id, "cancelled before batch read").await;
            }

            let batch = self.read_batch(&mut reader)?;
            if batch.is_empty() {
                break;
            }

            let results = match self.classify_batch(&job_id, next_batch, batch).await {
                Some(results) => results,
                // Cancellation mid-batch discards the partial batch
                None => return self.pause(&job_id, "cancelled mid-batch").await,
            };

            let batch_rows = results.len() as i64;
            match self.job_store.commit_batch(&job_id, next_batch, &results).await {
                Ok(()) => {},
                Err(JobStoreError::JobNotRunning(_)) => {
                    tracing::warn!("Job {} was cancelled externally; stopping", job_id);
                    return Ok(self.job_store.summary(&job_id).await?);
                },
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Batch commit failed for job {}: {}", job_id, message);
                    self.job_store
                        .finish_job(&job_id, JobStatus::Failed, None, Some(&message))
                        .await?;
                    return Err(e.into());
                },
            }

            committed_rows += batch_rows;
            tracing::info!(
                "Job {}: committed batch {} ({} rows, {} total)",
                job_id,
                next_batch,
                batch_rows,
                committed_rows
            );
            next_batch += 1;
        }

        self.job_store
            .finish_job(&job_id, JobStatus::Completed, Some(committed_rows), None)
            .await?;

        let summary = self.job_store.summary(&job_id).await?;
        tracing::info!(
            "Job {} completed: {} processed, {} failed, cost {:.4}, {} resume(s)",
            summary.job_id,
            summary.processed_count,
            summary.failed_count,
            summary.cost_accum,
            summary.resume_count
        );
        Ok(summary)
    }

    async fn pause(&self, job_id: &str, reason: &str) -> Result<JobSummary, RunnerError> {
        tracing::info!("Job {} pausing cleanly: {}", job_id, reason);
        self.job_store.finish_job(job_id, JobStatus::Paused, None, None).await?;
        Ok(self.job_store.summary(job_id).await?)
    }

    fn read_batch(&self, reader: &mut LeadReader) -> Result<Vec<BatchEntry>, SpreadsheetError> {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while batch.len() < self.config.batch_size {
            match reader.next_row()? {
                Some(RowRead::Record(record)) => batch.push(BatchEntry::Record(record)),
                Some(RowRead::Malformed { row_index, message }) => {
                    batch.push(BatchEntry::Malformed { row_index, message });
                },
                None => break,
            }
        }
        Ok(batch)
    }

    /// Classify one batch. Returns `None` when cancellation interrupted the
    /// work; the caller discards the partial batch.
    async fn classify_batch(
        &self,
        job_id: &str,
        batch_index: i64,
        batch: Vec<BatchEntry>,
    ) -> Option<Vec<LeadResult>> {
        let mut slots: Vec<Option<LeadResult>> = Vec::with_capacity(batch.len());
        slots.resize_with(batch.len(), || None);

        // Malformed rows resolve immediately
        let mut record_by_slot: Vec<Option<LeadRecord>> = Vec::with_capacity(batch.len());
        record_by_slot.resize_with(batch.len(), || None);
        for (slot, entry) in batch.into_iter().enumerate() {
            match entry {
                BatchEntry::Record(record) => record_by_slot[slot] = Some(record),
                BatchEntry::Malformed { row_index, message } => {
                    slots[slot] = Some(malformed_result(job_id, batch_index, row_index, &message));
                },
            }
        }

        // Phase 1: the non-LLM layers in parallel, bounded by the worker
        // pool. Rows every local layer abstains on queue up for phase 2.
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut join_set: JoinSet<(usize, LocalDecision)> = JoinSet::new();

        for (slot, record) in record_by_slot.iter().enumerate() {
            let Some(record) = record else { continue };
            let permit = semaphore.clone().acquire_owned().await.ok()?;
            let orchestrator = Arc::clone(&self.orchestrator);
            let name = record.director_name.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let decision = orchestrator.classify_local(&name).await;
                (slot, decision)
            });
        }

        let mut needs_llm: Vec<usize> = Vec::new();
        let grace = Duration::from_millis(self.config.grace_window_ms);
        while !join_set.is_empty() {
            let joined = if self.cancelled() {
                // Grace window for in-flight rows, then give up the batch
                match tokio::time::timeout(grace, join_set.join_next()).await {
                    Ok(j) => j,
                    Err(_) => {
                        join_set.abort_all();
                        return None;
                    },
                }
            } else {
                join_set.join_next().await
            };

            match joined {
                Some(Ok((slot, LocalDecision::Resolved(classification)))) => {
                    let record = record_by_slot[slot].as_ref()?;
                    slots[slot] = Some(result_for(job_id, batch_index, record, &classification, 0));
                },
                Some(Ok((slot, LocalDecision::NeedsLlm))) => needs_llm.push(slot),
                Some(Err(e)) => {
                    tracing::error!("Classification task panicked: {}", e);
                    return None;
                },
                None => break,
            }
        }

        if self.cancelled() {
            return None;
        }

        // Phase 2: LLM-bound rows sequentially in input order, so an answer
        // learned from an earlier row resolves later ones without another
        // call.
        needs_llm.sort_unstable();
        for slot in needs_llm {
            if self.cancelled() {
                return None;
            }
            let record = record_by_slot[slot].as_ref()?;

            let (classification, retries) = self.classify_with_retry(job_id, record).await;
            slots[slot] = Some(result_for(job_id, batch_index, record, &classification, retries));
        }

        let mut results: Vec<LeadResult> = slots.into_iter().flatten().collect();
        results.sort_by_key(|r| r.row_index);
        Some(results)
    }

    /// Full-cascade classification with the micro-batch retry policy:
    /// retryable errors back off and try again, up to the configured
    /// attempt budget. Provider failover happens inside the adapter.
    async fn classify_with_retry(
        &self,
        job_id: &str,
        record: &LeadRecord,
    ) -> (Classification, i64) {
        let mut retries = 0i64;
        loop {
            let classification = self
                .orchestrator
                .classify_for_job(&record.director_name, Some(job_id))
                .await;

            let retryable = classification
                .error_kind()
                .map(|k| k.is_retryable())
                .unwrap_or(false);

            if !retryable || retries + 1 >= self.config.retry_attempts as i64 {
                return (classification, retries);
            }

            retries += 1;
            let delay = self.backoff_delay(retries as u32);
            tracing::warn!(
                "Retrying row {} ('{}') after {:?} (attempt {})",
                record.row_index,
                record.director_name,
                delay,
                retries + 1
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let base = self.config.retry_backoff_ms.max(1);
        let exp = base.saturating_mul(1 << (retry - 1).min(6));
        let jitter = rand::thread_rng().gen_range(0..=base);
        Duration::from_millis(exp + jitter)
    }
}

fn result_for(
    job_id: &str,
    batch_index: i64,
    record: &LeadRecord,
    classification: &Classification,
    retries: i64,
) -> LeadResult {
    let status = match classification.error_kind() {
        None => ProcessingStatus::Success,
        // A retryable kind still present here means the budget ran out
        Some(kind) if kind.is_retryable() => ProcessingStatus::RetryExhausted,
        Some(_) => ProcessingStatus::Failed,
    };
    LeadResult::from_classification(job_id, batch_index, record, classification, status, retries)
}

fn malformed_result(job_id: &str, batch_index: i64, row_index: i64, message: &str) -> LeadResult {
    LeadResult {
        job_id: job_id.to_string(),
        row_index,
        batch_index,
        input_fields: "{}".to_string(),
        director_name: String::new(),
        normalised_name: None,
        category: None,
        confidence: None,
        method: None,
        provider: None,
        latency_ms: 0,
        cost: 0.0,
        processing_status: ProcessingStatus::Failed.as_str().to_string(),
        retry_count: 0,
        error_kind: Some(ErrorKind::MalformedRow.as_str().to_string()),
        error_message: Some(message.to_string()),
        created_at: chrono::Utc::now(),
    }
}
