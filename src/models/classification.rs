//! Classification result types.
//!
//! A `Classification` is the outcome of running one name through the
//! cascade. Failures are a separate branch of `Outcome`, never a sentinel
//! category value smuggled through the success path.

use serde::{Deserialize, Serialize};

use super::category::{Category, Method};

// ============================================================================
// Error taxonomy
// ============================================================================

/// Dotted error kinds surfaced on classifications and job summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyName,
    NameTooComplex,
    MalformedRow,
    LlmRateLimited,
    LlmTimeout,
    LlmTransport,
    LlmMalformed,
    LlmRefused,
    StoreConflict,
    StoreIo,
    InternalBug,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyName => "input.empty_name",
            Self::NameTooComplex => "input.name_too_complex",
            Self::MalformedRow => "input.malformed_row",
            Self::LlmRateLimited => "llm.rate_limited",
            Self::LlmTimeout => "llm.timeout",
            Self::LlmTransport => "llm.transport",
            Self::LlmMalformed => "llm.malformed",
            Self::LlmRefused => "llm.refused",
            Self::StoreConflict => "store.conflict",
            Self::StoreIo => "store.io",
            Self::InternalBug => "internal.bug",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "input.empty_name" => Some(Self::EmptyName),
            "input.name_too_complex" => Some(Self::NameTooComplex),
            "input.malformed_row" => Some(Self::MalformedRow),
            "llm.rate_limited" => Some(Self::LlmRateLimited),
            "llm.timeout" => Some(Self::LlmTimeout),
            "llm.transport" => Some(Self::LlmTransport),
            "llm.malformed" => Some(Self::LlmMalformed),
            "llm.refused" => Some(Self::LlmRefused),
            "store.conflict" => Some(Self::StoreConflict),
            "store.io" => Some(Self::StoreIo),
            "internal.bug" => Some(Self::InternalBug),
            _ => None,
        }
    }

    /// Kinds the runner may retry with backoff and provider failover.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmRateLimited | Self::LlmTimeout | Self::LlmTransport)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// A runner-up category with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub category: Category,
    pub confidence: f64,
}

/// Success or failure branch of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Result of classifying one name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub input_name: String,
    pub normalised_name: String,
    pub category: Category,
    pub confidence: f64,
    pub method: Method,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Estimated spend for this classification (zero for non-LLM layers).
    pub cost: f64,
    pub alternatives: Vec<Alternative>,
    pub outcome: Outcome,
}

impl Classification {
    /// A successful classification from one of the cascade layers.
    pub fn resolved(
        input_name: impl Into<String>,
        normalised_name: impl Into<String>,
        category: Category,
        confidence: f64,
        method: Method,
    ) -> Self {
        Self {
            input_name: input_name.into(),
            normalised_name: normalised_name.into(),
            category,
            confidence,
            method,
            latency_ms: 0,
            provider: None,
            cost: 0.0,
            alternatives: Vec::new(),
            outcome: Outcome::Success,
        }
    }

    /// A failed classification carrying the error kind.
    pub fn failed(
        input_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let input_name = input_name.into();
        Self {
            normalised_name: input_name.clone(),
            input_name,
            category: Category::Unknown,
            confidence: 0.0,
            method: Method::Rule,
            latency_ms: 0,
            provider: None,
            cost: 0.0,
            alternatives: Vec::new(),
            outcome: Outcome::Failed { kind, message: message.into() },
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<Alternative>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.outcome.error_kind()
    }
}
