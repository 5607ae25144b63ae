//! Input lead records and their per-row processing results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::category::{Category, Method};
use super::classification::{Classification, ErrorKind};

// ============================================================================
// Input record
// ============================================================================

/// One typed input row after column mapping.
///
/// The reader extracts the director-name column; every other column rides
/// along as an opaque string bag and is reproduced untouched on export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Zero-based position in the input stream, stable across resumes.
    pub row_index: i64,
    pub director_name: String,
    pub extra_fields: BTreeMap<String, String>,
}

// ============================================================================
// Processing status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    Failed,
    RetryExhausted,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RetryExhausted => "retry_exhausted",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "retry_exhausted" => Self::RetryExhausted,
            _ => Self::Failed,
        }
    }
}

// ============================================================================
// Lead result
// ============================================================================

/// Finished row as stored in `lead_processing_results`. Immutable once a
/// batch commit lands.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeadResult {
    pub job_id: String,
    pub row_index: i64,
    pub batch_index: i64,
    /// JSON object of the carried-through input columns.
    pub input_fields: String,
    pub director_name: String,
    pub normalised_name: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f64>,
    pub method: Option<String>,
    pub provider: Option<String>,
    pub latency_ms: i64,
    pub cost: f64,
    pub processing_status: String,
    pub retry_count: i64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeadResult {
    pub fn status_enum(&self) -> ProcessingStatus {
        ProcessingStatus::parse_status(&self.processing_status)
    }

    pub fn category_enum(&self) -> Option<Category> {
        self.category.as_deref().map(Category::parse_category)
    }

    pub fn method_enum(&self) -> Option<Method> {
        self.method.as_deref().and_then(Method::parse_method)
    }

    pub fn error_kind_enum(&self) -> Option<ErrorKind> {
        self.error_kind.as_deref().and_then(ErrorKind::parse_kind)
    }

    /// Build the stored row from a record and its finished classification.
    pub fn from_classification(
        job_id: &str,
        batch_index: i64,
        record: &LeadRecord,
        classification: &Classification,
        status: ProcessingStatus,
        retry_count: i64,
    ) -> Self {
        let (error_kind, error_message) = match &classification.outcome {
            crate::models::Outcome::Success => (None, None),
            crate::models::Outcome::Failed { kind, message } => {
                (Some(kind.as_str().to_string()), Some(message.clone()))
            },
        };

        let classified = classification.outcome.is_success();

        Self {
            job_id: job_id.to_string(),
            row_index: record.row_index,
            batch_index,
            input_fields: serde_json::to_string(&record.extra_fields).unwrap_or_else(|_| "{}".into()),
            director_name: record.director_name.clone(),
            normalised_name: classified.then(|| classification.normalised_name.clone()),
            category: classified.then(|| classification.category.as_str().to_string()),
            confidence: classified.then_some(classification.confidence),
            method: classified.then(|| classification.method.as_str().to_string()),
            provider: classification.provider.clone(),
            latency_ms: classification.latency_ms as i64,
            cost: classification.cost,
            processing_status: status.as_str().to_string(),
            retry_count,
            error_kind,
            error_message,
            created_at: Utc::now(),
        }
    }
}
