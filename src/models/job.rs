//! Job execution rows, locks and summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Job status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "paused" => Self::Paused,
            _ => Self::Failed,
        }
    }

    /// Terminal states release the input lock and refuse further commits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// Job execution
// ============================================================================

/// One run over one input file, as stored in `job_executions`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_id: String,
    pub input_path: String,
    pub input_fingerprint: String,
    pub output_path: String,
    pub batch_size: i64,
    pub total_rows: Option<i64>,
    /// -1 until the first batch commits.
    pub last_committed_batch: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cost_accum: f64,
    pub time_accum_ms: i64,
    pub resume_count: i64,
    pub error_summary: Option<String>,
}

impl JobExecution {
    pub fn status_enum(&self) -> JobStatus {
        JobStatus::parse_status(&self.status)
    }
}

/// Per-input-file exclusion record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobLock {
    pub input_path: String,
    pub job_id: String,
    pub held_by: String,
    pub acquired_at: DateTime<Utc>,
}

// ============================================================================
// Job summary
// ============================================================================

/// Aggregated view of a finished (or interrupted) run, returned by
/// `run_job` and printed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub input_path: String,
    pub output_path: String,
    pub status: JobStatus,
    pub total_rows: Option<i64>,
    pub processed_count: i64,
    pub failed_count: i64,
    pub cost_accum: f64,
    pub time_accum_ms: i64,
    pub resume_count: i64,
    /// Row counts keyed by classification method (`cache`, `rule`, ...).
    pub method_counts: BTreeMap<String, i64>,
    /// Row counts keyed by dotted error kind.
    pub error_counts: BTreeMap<String, i64>,
    pub error_summary: Option<String>,
}

impl JobSummary {
    pub fn committed_rows(&self) -> i64 {
        self.processed_count + self.failed_count
    }
}
