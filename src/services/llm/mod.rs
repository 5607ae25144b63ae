//! LLM fallback layer.
//!
//! Provider-agnostic name classification over OpenAI-compatible chat
//! APIs, with per-provider token buckets, bounded retries and failover.

mod client;
mod models;
mod service;

pub use models::{CONFIDENCE_CEILING, CONFIDENCE_FLOOR, LlmAnswer, LlmError};
pub use service::{LlmAdapter, LlmBackend};

#[cfg(test)]
mod tests;
