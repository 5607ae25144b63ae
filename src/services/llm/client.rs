//! LLM HTTP client for OpenAI-compatible chat-completion APIs.
//!
//! One request carries a batch of names; the response is parsed
//! defensively and rejected as malformed on any schema violation.

use reqwest::Client;
use std::time::Duration;

use crate::config::LlmProviderConfig;
use crate::models::Category;

use super::models::*;

const SYSTEM_PROMPT: &str = include_str!("classify_prompt.md");

/// Raw per-name result before confidence clamping.
#[derive(Debug, Clone)]
pub(crate) struct RawAnswer {
    pub name: String,
    pub category: Category,
    pub confidence: f64,
}

pub struct LlmClient {
    http_client: Client,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client }
    }

    /// Send one batch of names to a provider. Returns the raw answers plus
    /// token usage for cost accounting.
    pub(crate) async fn classify_batch(
        &self,
        provider: &LlmProviderConfig,
        names: &[String],
        timeout: Duration,
    ) -> Result<(Vec<RawAnswer>, i32, i32), LlmError> {
        if provider.api_key.is_empty() {
            return Err(LlmError::Transport(format!(
                "API key not configured for provider '{}'",
                provider.tag
            )));
        }

        let user_prompt = serde_json::to_string(names)
            .map_err(|e| LlmError::Malformed(format!("request serialization: {}", e)))?;

        let chat_request = ChatCompletionRequest {
            model: provider.model_name.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt },
            ],
            max_tokens: Some(2048),
            temperature: Some(0.0),
            response_format: Some(ResponseFormat { r#type: "json_object".to_string() }),
        };

        let url = format!("{}/chat/completions", provider.api_base.trim_end_matches('/'));

        tracing::debug!(
            "Calling LLM API: {} with model {} ({} names)",
            url,
            provider.model_name,
            names.len()
        );

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(timeout.as_millis() as u64)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Transport(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| LlmError::Malformed("Empty response from LLM".to_string()))?;

        let answers = parse_response_content(content, names)?;

        let input_tokens = chat_response
            .usage
            .as_ref()
            .map(|u| u.prompt_tokens)
            .unwrap_or(0);
        let output_tokens = chat_response
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0);

        Ok((answers, input_tokens, output_tokens))
    }
}

/// Parse the model's JSON payload into per-name answers aligned with the
/// request order. Missing names, unknown categories and count mismatches
/// are all schema violations.
pub(crate) fn parse_response_content(
    content: &str,
    names: &[String],
) -> Result<Vec<RawAnswer>, LlmError> {
    let payload: ClassificationPayload = serde_json::from_str(content).map_err(|e| {
        LlmError::Malformed(format!("Failed to parse LLM response: {}. Content: {}", e, content))
    })?;

    if payload.classifications.len() != names.len() {
        return Err(LlmError::Malformed(format!(
            "Expected {} classifications, got {}",
            names.len(),
            payload.classifications.len()
        )));
    }

    let mut answers = Vec::with_capacity(names.len());
    for (expected, item) in names.iter().zip(payload.classifications) {
        let returned = item.name.trim();
        if !returned.is_empty() && !returned.eq_ignore_ascii_case(expected) {
            return Err(LlmError::Malformed(format!(
                "Response name '{}' does not match requested '{}'",
                item.name, expected
            )));
        }

        let category = Category::parse_category(&item.category);
        if category == Category::Unknown {
            return Err(LlmError::Malformed(format!(
                "Unknown category '{}' for '{}'",
                item.category, expected
            )));
        }

        if !(0.0..=1.0).contains(&item.confidence) {
            return Err(LlmError::Malformed(format!(
                "Confidence {} out of range for '{}'",
                item.confidence, expected
            )));
        }

        answers.push(RawAnswer {
            name: expected.clone(),
            category,
            confidence: item.confidence,
        });
    }

    Ok(answers)
}
