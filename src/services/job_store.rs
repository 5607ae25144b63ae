//! Job store repository.
//!
//! Durable record of job executions, per-row results and per-input-file
//! locks. `commit_batch` is the sole durability boundary for progress:
//! anything not in a committed batch is unprocessed and will be re-read on
//! resume.

use std::collections::BTreeMap;
use std::path::Path;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{JobExecution, JobLock, JobStatus, JobSummary, LeadResult, ProcessingStatus};

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("another job ({job_id}) is already running on '{input_path}'")]
    ConcurrentJob { input_path: String, job_id: String },

    #[error("input file changed since job {job_id} (fingerprint {expected} != {actual})")]
    InputChanged { job_id: String, expected: String, actual: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {0} is not running")]
    JobNotRunning(String),

    #[error("batch committed out of order: expected {expected}, got {got}")]
    OutOfOrderCommit { expected: i64, got: i64 },

    #[error("job database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Compute the cheap size+mtime fingerprint of an input file.
pub fn input_fingerprint(path: &Path) -> std::io::Result<String> {
    let metadata = std::fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(format!("{}:{}", metadata.len(), mtime))
}

/// Process tag recorded on lock rows, `hostname:pid`.
fn process_tag() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    format!("{}:{}", host, std::process::id())
}

/// True when the lock's owning process is demonstrably gone (same host).
fn holder_is_gone(held_by: &str) -> bool {
    let Some((host, pid)) = held_by.rsplit_once(':') else {
        return false;
    };
    let our_host = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    if host != our_host {
        return false;
    }
    match pid.parse::<u32>() {
        Ok(pid) if pid == std::process::id() => false,
        // Without procfs we cannot tell; assume the holder is alive
        Ok(pid) => Path::new("/proc").exists() && !Path::new(&format!("/proc/{}", pid)).exists(),
        Err(_) => false,
    }
}

pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Job lifecycle
    // ========================================================================

    /// Start a new job, acquiring the input-file lock atomically.
    pub async fn begin_job(
        &self,
        input_path: &str,
        input_fingerprint: &str,
        output_path: &str,
        batch_size: usize,
    ) -> Result<String, JobStoreError> {
        let mut tx = self.pool.begin().await?;

        // An existing lock whose job still runs blocks the attempt
        let lock = sqlx::query_as::<_, JobLock>("SELECT * FROM job_locks WHERE input_path = ?")
            .bind(input_path)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(lock) = lock {
            let owner = sqlx::query_as::<_, JobExecution>(
                "SELECT * FROM job_executions WHERE job_id = ?",
            )
            .bind(&lock.job_id)
            .fetch_optional(&mut *tx)
            .await?;

            let owner_running =
                owner.map(|j| j.status_enum() == JobStatus::Running).unwrap_or(false);
            if owner_running && !holder_is_gone(&lock.held_by) {
                return Err(JobStoreError::ConcurrentJob {
                    input_path: input_path.to_string(),
                    job_id: lock.job_id,
                });
            }

            sqlx::query("DELETE FROM job_locks WHERE input_path = ?")
                .bind(input_path)
                .execute(&mut *tx)
                .await?;
        }

        // A pending earlier job with a different fingerprint means the file
        // was rewritten; refuse unless the caller chose a fresh output path
        let earlier = sqlx::query_as::<_, JobExecution>(
            r#"SELECT * FROM job_executions
               WHERE input_path = ? AND status IN ('running', 'paused')
               ORDER BY started_at DESC LIMIT 1"#,
        )
        .bind(input_path)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(earlier) = earlier
            && earlier.input_fingerprint != input_fingerprint
            && earlier.output_path == output_path
        {
            return Err(JobStoreError::InputChanged {
                job_id: earlier.job_id,
                expected: earlier.input_fingerprint,
                actual: input_fingerprint.to_string(),
            });
        }

        let job_id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"INSERT INTO job_executions
               (job_id, input_path, input_fingerprint, output_path, batch_size, status)
               VALUES (?, ?, ?, ?, ?, 'running')"#,
        )
        .bind(&job_id)
        .bind(input_path)
        .bind(input_fingerprint)
        .bind(output_path)
        .bind(batch_size as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO job_locks (input_path, job_id, held_by) VALUES (?, ?, ?)",
        )
        .bind(input_path)
        .bind(&job_id)
        .bind(process_tag())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job_id)
    }

    /// Find the most recent resumable job for an input file and take over
    /// its lock. Returns `None` when there is nothing to resume.
    pub async fn resume_job(
        &self,
        input_path: &str,
        input_fingerprint: &str,
    ) -> Result<Option<JobExecution>, JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobExecution>(
            r#"SELECT * FROM job_executions
               WHERE input_path = ? AND input_fingerprint = ? AND status IN ('running', 'paused')
               ORDER BY started_at DESC LIMIT 1"#,
        )
        .bind(input_path)
        .bind(input_fingerprint)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            return Ok(None);
        };

        // A live lock held by another process blocks the takeover
        let lock = sqlx::query_as::<_, JobLock>("SELECT * FROM job_locks WHERE input_path = ?")
            .bind(input_path)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(lock) = lock
            && lock.held_by != process_tag()
            && !holder_is_gone(&lock.held_by)
            && job.status_enum() == JobStatus::Running
            && lock.job_id != job.job_id
        {
            return Err(JobStoreError::ConcurrentJob {
                input_path: input_path.to_string(),
                job_id: lock.job_id,
            });
        }

        sqlx::query(
            r#"INSERT INTO job_locks (input_path, job_id, held_by) VALUES (?, ?, ?)
               ON CONFLICT(input_path) DO UPDATE SET
               job_id = excluded.job_id,
               held_by = excluded.held_by,
               acquired_at = CURRENT_TIMESTAMP"#,
        )
        .bind(input_path)
        .bind(&job.job_id)
        .bind(process_tag())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE job_executions SET status = 'running', resume_count = resume_count + 1 WHERE job_id = ?",
        )
        .bind(&job.job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let refreshed = self.get_job(&job.job_id).await?;
        Ok(Some(refreshed))
    }

    /// Atomically write a batch of results and advance the job counters.
    pub async fn commit_batch(
        &self,
        job_id: &str,
        batch_index: i64,
        results: &[LeadResult],
    ) -> Result<(), JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobExecution>(
            "SELECT * FROM job_executions WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;

        if job.status_enum() != JobStatus::Running {
            return Err(JobStoreError::JobNotRunning(job_id.to_string()));
        }

        let expected = job.last_committed_batch + 1;
        if batch_index != expected {
            return Err(JobStoreError::OutOfOrderCommit { expected, got: batch_index });
        }

        let mut processed = 0i64;
        let mut failed = 0i64;
        let mut cost = 0.0f64;
        let mut time_ms = 0i64;

        for result in results {
            sqlx::query(
                r#"INSERT INTO lead_processing_results
                   (job_id, row_index, batch_index, input_fields, director_name,
                    normalised_name, category, confidence, method, provider,
                    latency_ms, cost, processing_status, retry_count, error_kind, error_message)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&result.job_id)
            .bind(result.row_index)
            .bind(batch_index)
            .bind(&result.input_fields)
            .bind(&result.director_name)
            .bind(&result.normalised_name)
            .bind(&result.category)
            .bind(result.confidence)
            .bind(&result.method)
            .bind(&result.provider)
            .bind(result.latency_ms)
            .bind(result.cost)
            .bind(&result.processing_status)
            .bind(result.retry_count)
            .bind(&result.error_kind)
            .bind(&result.error_message)
            .execute(&mut *tx)
            .await?;

            match result.status_enum() {
                ProcessingStatus::Success => processed += 1,
                ProcessingStatus::Failed | ProcessingStatus::RetryExhausted => failed += 1,
            }
            cost += result.cost;
            time_ms += result.latency_ms;
        }

        sqlx::query(
            r#"UPDATE job_executions SET
               last_committed_batch = ?,
               processed_count = processed_count + ?,
               failed_count = failed_count + ?,
               cost_accum = cost_accum + ?,
               time_accum_ms = time_accum_ms + ?
               WHERE job_id = ?"#,
        )
        .bind(batch_index)
        .bind(processed)
        .bind(failed)
        .bind(cost)
        .bind(time_ms)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Set a terminal (or paused) status and release the lock.
    pub async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        total_rows: Option<i64>,
        error_summary: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let completed_at = if status.is_terminal() { "CURRENT_TIMESTAMP" } else { "NULL" };
        let sql = format!(
            r#"UPDATE job_executions SET
               status = ?, completed_at = {}, total_rows = COALESCE(?, total_rows),
               error_summary = ?
               WHERE job_id = ?"#,
            completed_at
        );

        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(total_rows)
            .bind(error_summary)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }

        sqlx::query("DELETE FROM job_locks WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Pause a running job and release its lock. The owning runner notices
    /// on its next commit and stops.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), JobStoreError> {
        let job = self.get_job(job_id).await?;
        if job.status_enum().is_terminal() {
            return Err(JobStoreError::JobNotRunning(job_id.to_string()));
        }
        self.finish_job(job_id, JobStatus::Paused, None, None).await
    }

    /// Remove locks whose job is no longer running or whose process is
    /// demonstrably gone. Returns the number of locks released.
    pub async fn release_stale_locks(&self, age_threshold_secs: i64) -> Result<u64, JobStoreError> {
        let locks = sqlx::query_as::<_, JobLock>("SELECT * FROM job_locks")
            .fetch_all(&self.pool)
            .await?;

        let mut released = 0u64;
        for lock in locks {
            let owner = sqlx::query_as::<_, JobExecution>(
                "SELECT * FROM job_executions WHERE job_id = ?",
            )
            .bind(&lock.job_id)
            .fetch_optional(&self.pool)
            .await?;

            let owner_running =
                owner.map(|j| j.status_enum() == JobStatus::Running).unwrap_or(false);
            let age_secs = (chrono::Utc::now() - lock.acquired_at).num_seconds();
            let stale = !owner_running
                || holder_is_gone(&lock.held_by)
                || age_secs > age_threshold_secs;

            if stale {
                sqlx::query("DELETE FROM job_locks WHERE input_path = ?")
                    .bind(&lock.input_path)
                    .execute(&self.pool)
                    .await?;
                tracing::info!(
                    "Released stale lock on '{}' (job {}, held by {})",
                    lock.input_path,
                    lock.job_id,
                    lock.held_by
                );
                released += 1;
            }
        }
        Ok(released)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_job(&self, job_id: &str) -> Result<JobExecution, JobStoreError> {
        sqlx::query_as::<_, JobExecution>("SELECT * FROM job_executions WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<JobExecution>, JobStoreError> {
        sqlx::query_as::<_, JobExecution>(
            "SELECT * FROM job_executions ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(JobStoreError::from)
    }

    /// All committed results for a job in row order.
    pub async fn job_results(&self, job_id: &str) -> Result<Vec<LeadResult>, JobStoreError> {
        sqlx::query_as::<_, LeadResult>(
            "SELECT * FROM lead_processing_results WHERE job_id = ? ORDER BY row_index ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(JobStoreError::from)
    }

    /// Aggregate a job into its user-facing summary.
    pub async fn summary(&self, job_id: &str) -> Result<JobSummary, JobStoreError> {
        let job = self.get_job(job_id).await?;

        let method_rows = sqlx::query_as::<_, (String, i64)>(
            r#"SELECT method, COUNT(*) FROM lead_processing_results
               WHERE job_id = ? AND method IS NOT NULL GROUP BY method"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let error_rows = sqlx::query_as::<_, (String, i64)>(
            r#"SELECT error_kind, COUNT(*) FROM lead_processing_results
               WHERE job_id = ? AND error_kind IS NOT NULL GROUP BY error_kind"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(JobSummary {
            job_id: job.job_id,
            input_path: job.input_path,
            output_path: job.output_path,
            status: JobStatus::parse_status(&job.status),
            total_rows: job.total_rows,
            processed_count: job.processed_count,
            failed_count: job.failed_count,
            cost_accum: job.cost_accum,
            time_accum_ms: job.time_accum_ms,
            resume_count: job.resume_count,
            method_counts: method_rows.into_iter().collect::<BTreeMap<_, _>>(),
            error_counts: error_rows.into_iter().collect::<BTreeMap<_, _>>(),
            error_summary: job.error_summary,
        })
    }
}
