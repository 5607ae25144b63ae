//! LLM adapter: bounded, rate-limited, multi-provider classification.
//!
//! Requests go to the primary provider first; persistent rate-limiting or
//! transport failure beyond the local retry budget fails over to the
//! secondary. A token bucket per provider enforces documented rates.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use rand::Rng;

use crate::config::{LlmConfig, LlmProviderConfig};

use super::client::LlmClient;
use super::models::*;

/// Provider-agnostic seam for the LLM layer. The production implementation
/// is [`LlmAdapter`]; tests substitute scripted backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Whether any provider is configured at all.
    fn is_available(&self) -> bool;

    /// Classify a batch of normalised names; the result is aligned with
    /// the input.
    async fn classify_llm(&self, names: &[String]) -> Vec<Result<LlmAnswer, LlmError>>;
}

struct ProviderRuntime {
    config: LlmProviderConfig,
    limiter: DefaultDirectRateLimiter,
}

pub struct LlmAdapter {
    client: LlmClient,
    /// Primary first, then secondary.
    providers: Vec<ProviderRuntime>,
    per_attempt_timeout: Duration,
    /// Total deadline for one batch of names, across retries and failover.
    batch_deadline: Duration,
    max_retries: u32,
    max_names_per_request: usize,
}

impl LlmAdapter {
    pub fn new(config: &LlmConfig) -> Self {
        let client = LlmClient::new();
        let mut providers = Vec::new();
        for tag in [&config.primary, &config.secondary] {
            if tag.is_empty() {
                continue;
            }
            if let Some(provider) = config.providers.iter().find(|p| &p.tag == tag) {
                let rpm = NonZeroU32::new(provider.requests_per_minute.max(1))
                    .unwrap_or(NonZeroU32::MIN);
                providers.push(ProviderRuntime {
                    config: provider.clone(),
                    limiter: RateLimiter::direct(Quota::per_minute(rpm)),
                });
            }
        }

        if providers.is_empty() {
            tracing::warn!("No LLM providers configured; the LLM layer will refuse all requests");
        } else {
            tracing::info!(
                "LLM adapter ready: {}",
                providers
                    .iter()
                    .map(|p| p.config.tag.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
        }

        Self {
            client,
            providers,
            per_attempt_timeout: Duration::from_millis(config.per_attempt_timeout_ms),
            batch_deadline: Duration::from_millis(config.batch_deadline_ms.max(1)),
            max_retries: config.max_retries.max(1),
            max_names_per_request: config.max_names_per_request.max(1),
        }
    }

    pub fn primary_tag(&self) -> Option<&str> {
        self.providers.first().map(|p| p.config.tag.as_str())
    }
}

#[async_trait]
impl LlmBackend for LlmAdapter {
    fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Classify a batch of normalised names. The result is aligned with
    /// the input: each slot carries either an accepted answer or the error
    /// that stopped it.
    async fn classify_llm(&self, names: &[String]) -> Vec<Result<LlmAnswer, LlmError>> {
        if names.is_empty() {
            return Vec::new();
        }
        if self.providers.is_empty() {
            return names.iter().map(|_| Err(LlmError::NoProviderConfigured)).collect();
        }

        let mut results = Vec::with_capacity(names.len());
        for chunk in names.chunks(self.max_names_per_request) {
            let attempt = tokio::time::timeout(self.batch_deadline, self.classify_chunk(chunk));
            match attempt.await {
                Ok(Ok(answers)) => results.extend(answers),
                Ok(Err(e)) => {
                    // Batch-level failure applies to every name in the chunk
                    results.extend(chunk.iter().map(|_| Err(e.clone())));
                },
                Err(_) => {
                    let e = LlmError::Timeout(self.batch_deadline.as_millis() as u64);
                    results.extend(chunk.iter().map(|_| Err(e.clone())));
                },
            }
        }
        results
    }
}

impl LlmAdapter {
    /// One chunk through the provider chain.
    async fn classify_chunk(
        &self,
        names: &[String],
    ) -> Result<Vec<Result<LlmAnswer, LlmError>>, LlmError> {
        let mut last_error = LlmError::NoProviderConfigured;

        for (provider_index, provider) in self.providers.iter().enumerate() {
            if provider_index > 0 {
                tracing::warn!(
                    "Failing over to LLM provider '{}' after: {}",
                    provider.config.tag,
                    last_error
                );
            }

            for attempt in 1..=self.max_retries {
                provider
                    .limiter
                    .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                    .await;

                let call = self.client.classify_batch(
                    &provider.config,
                    names,
                    self.per_attempt_timeout,
                );

                match call.await {
                    Ok((raw, input_tokens, output_tokens)) => {
                        let cost = request_cost(&provider.config, input_tokens, output_tokens)
                            / names.len() as f64;
                        return Ok(raw
                            .into_iter()
                            .map(|answer| accept_answer(answer, &provider.config.tag, cost))
                            .collect());
                    },
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(
                            "LLM attempt {}/{} on '{}' failed: {}",
                            attempt,
                            self.max_retries,
                            provider.config.tag,
                            e
                        );
                        last_error = e;
                        if attempt < self.max_retries {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    },
                    // Malformed and refused responses are never retried
                    Err(e) => return Err(e),
                }
            }
        }

        Err(last_error)
    }
}

/// Clamp provider confidence into the accepted band, discarding answers
/// under the floor as refusals.
pub(crate) fn accept_answer(
    raw: super::client::RawAnswer,
    provider_tag: &str,
    cost: f64,
) -> Result<LlmAnswer, LlmError> {
    if raw.confidence < CONFIDENCE_FLOOR {
        return Err(LlmError::Refused(format!(
            "confidence {:.2} below floor for '{}'",
            raw.confidence, raw.name
        )));
    }

    Ok(LlmAnswer {
        normalised_name: raw.name,
        category: raw.category,
        confidence: raw.confidence.min(CONFIDENCE_CEILING),
        provider_tag: provider_tag.to_string(),
        cost,
    })
}

fn request_cost(provider: &LlmProviderConfig, input_tokens: i32, output_tokens: i32) -> f64 {
    (input_tokens as f64 * provider.cost_per_1k_input
        + output_tokens as f64 * provider.cost_per_1k_output)
        / 1000.0
}

/// Exponential backoff with uniform jitter: 500ms, 1s, 2s, ...
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 500u64.saturating_mul(1 << (attempt - 1).min(6));
    let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(base_ms + jitter_ms)
}
