//! LLM adapter data models.

use serde::{Deserialize, Serialize};

use crate::models::{Category, ErrorKind};

// ============================================================================
// Answers
// ============================================================================

/// One accepted provider answer for one name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnswer {
    pub normalised_name: String,
    pub category: Category,
    /// Clamped to [0.5, 0.95] before this struct exists.
    pub confidence: f64,
    pub provider_tag: String,
    /// Estimated spend attributed to this name.
    pub cost: f64,
}

/// Provider confidence bounds. Anything under the floor is treated as a
/// refusal; anything above the ceiling is capped.
pub const CONFIDENCE_FLOOR: f64 = 0.5;
pub const CONFIDENCE_CEILING: f64 = 0.95;

// ============================================================================
// Errors
// ============================================================================

/// LLM adapter errors. Clone-able so a batch-level failure can be fanned
/// out to every name in the batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("no LLM provider configured")]
    NoProviderConfigured,

    #[error("provider rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider timeout after {0}ms")]
    Timeout(u64),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider refused to classify: {0}")]
    Refused(String),
}

impl LlmError {
    /// Retryable errors trigger backoff and, persistently, failover.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transport(_) | Self::Timeout(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProviderConfigured => ErrorKind::LlmTransport,
            Self::RateLimited(_) => ErrorKind::LlmRateLimited,
            Self::Transport(_) => ErrorKind::LlmTransport,
            Self::Timeout(_) => ErrorKind::LlmTimeout,
            Self::Malformed(_) => ErrorKind::LlmMalformed,
            Self::Refused(_) => ErrorKind::LlmRefused,
        }
    }
}

// ============================================================================
// Wire types (OpenAI-compatible chat completions)
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    pub r#type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
}

/// Shape the prompt asks the model to return.
#[derive(Debug, Deserialize)]
pub(crate) struct ClassificationPayload {
    #[serde(default)]
    pub classifications: Vec<ClassificationItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassificationItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: f64,
}
