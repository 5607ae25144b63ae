//! Classifier orchestrator.
//!
//! Cascades each name through cache, rules, learned patterns, phonetics
//! and finally the LLM, short-circuiting on the first layer that answers.
//! An LLM answer is committed to the learning store before it is returned,
//! so the next row in the same batch can reuse it.

use std::sync::Arc;
use std::time::Instant;

use crate::models::{Classification, ErrorKind, Method};
use crate::services::learning::LearningStore;
use crate::services::llm::LlmBackend;
use crate::services::normalizer::{self, NormalisedName};
use crate::services::phonetic_match::PhoneticClassifier;
use crate::services::rules::RuleClassifier;

/// Result of running only the local (non-LLM) layers.
pub enum LocalDecision {
    /// A layer answered, or the input itself failed.
    Resolved(Box<Classification>),
    /// Every local layer abstained; the name needs the LLM.
    NeedsLlm,
}

pub struct ClassifierOrchestrator {
    rules: RuleClassifier,
    phonetic: PhoneticClassifier,
    learning: Arc<LearningStore>,
    llm: Arc<dyn LlmBackend>,
}

impl ClassifierOrchestrator {
    pub fn new(
        rules: RuleClassifier,
        phonetic: PhoneticClassifier,
        learning: Arc<LearningStore>,
        llm: Arc<dyn LlmBackend>,
    ) -> Self {
        Self { rules, phonetic, learning, llm }
    }

    /// Classify one name through the full cascade.
    pub async fn classify(&self, raw_name: &str) -> Classification {
        self.classify_for_job(raw_name, None).await
    }

    /// Classify with job attribution for any patterns learned on the way.
    pub async fn classify_for_job(&self, raw_name: &str, job_id: Option<&str>) -> Classification {
        let started = Instant::now();

        let name = match normalizer::normalise(raw_name) {
            Ok(name) => name,
            Err(e) => {
                return finish(Classification::failed(raw_name, e.kind(), e.to_string()), started);
            },
        };

        match self.classify_local_layers(&name).await {
            LocalDecision::Resolved(classification) => finish(*classification, started),
            LocalDecision::NeedsLlm => {
                let classification = self.classify_via_llm(&name, job_id).await;
                finish(classification, started)
            },
        }
    }

    /// Run layers 1-5 only (normalise, cache, rules, learned affix,
    /// phonetics). The batch runner uses this for its parallel first pass.
    pub async fn classify_local(&self, raw_name: &str) -> LocalDecision {
        let started = Instant::now();

        let name = match normalizer::normalise(raw_name) {
            Ok(name) => name,
            Err(e) => {
                return LocalDecision::Resolved(Box::new(finish(
                    Classification::failed(raw_name, e.kind(), e.to_string()),
                    started,
                )));
            },
        };

        match self.classify_local_layers(&name).await {
            LocalDecision::Resolved(classification) => {
                LocalDecision::Resolved(Box::new(finish(*classification, started)))
            },
            LocalDecision::NeedsLlm => LocalDecision::NeedsLlm,
        }
    }

    async fn classify_local_layers(&self, name: &NormalisedName) -> LocalDecision {
        // Exact cache over confirmed LLM answers
        match self.learning.lookup_exact(&name.normalised).await {
            Ok(Some(mut hit)) => {
                hit.input_name = name.original.clone();
                tracing::debug!("Cache hit for '{}': {}", name.normalised, hit.category);
                return LocalDecision::Resolved(Box::new(hit));
            },
            Ok(None) => {},
            Err(e) => return LocalDecision::Resolved(Box::new(store_failure(name, e))),
        }

        // Deterministic rules over the curated dictionaries
        if let Some(classification) = self.rules.classify(name) {
            return LocalDecision::Resolved(Box::new(classification));
        }

        // Learned affix patterns count as phonetic-layer matches
        match self.learning.match_learned_affix(&name.normalised).await {
            Ok(Some(matched)) => {
                tracing::debug!(
                    "Learned pattern {} '{}' matched '{}'",
                    matched.kind.as_str(),
                    matched.value,
                    name.normalised
                );
                if let Err(e) = self.learning.record_application(matched.pattern_id, None).await {
                    tracing::warn!("Failed to record pattern application: {}", e);
                }
                let classification = Classification::resolved(
                    name.original.clone(),
                    name.normalised.clone(),
                    matched.category,
                    matched.confidence,
                    Method::Phonetic,
                );
                return LocalDecision::Resolved(Box::new(classification));
            },
            Ok(None) => {},
            Err(e) => return LocalDecision::Resolved(Box::new(store_failure(name, e))),
        }

        // Codec-agreement search over known names
        match self.phonetic.classify(name).await {
            Ok(Some(classification)) => LocalDecision::Resolved(Box::new(classification)),
            Ok(None) => LocalDecision::NeedsLlm,
            Err(e) => LocalDecision::Resolved(Box::new(store_failure(name, e))),
        }
    }

    async fn classify_via_llm(&self, name: &NormalisedName, job_id: Option<&str>) -> Classification {
        let mut results = self.llm.classify_llm(&[name.normalised.clone()]).await;

        match results.pop() {
            Some(Ok(answer)) => {
                let mut classification = Classification::resolved(
                    name.original.clone(),
                    name.normalised.clone(),
                    answer.category,
                    answer.confidence,
                    Method::Llm,
                )
                .with_provider(answer.provider_tag.clone());
                classification.cost = answer.cost;

                // Immediate learning: the answer and its derived patterns
                // must be durable before this call returns
                if let Err(e) =
                    self.learning.record_llm_answer(name, &classification, job_id).await
                {
                    tracing::error!("Failed to persist LLM answer for '{}': {}", name.normalised, e);
                    return Classification::failed(
                        name.original.clone(),
                        ErrorKind::StoreIo,
                        e.to_string(),
                    );
                }

                classification
            },
            Some(Err(e)) => {
                let mut failed =
                    Classification::failed(name.original.clone(), e.kind(), e.to_string());
                failed.normalised_name = name.normalised.clone();
                failed
            },
            None => {
                let mut failed = Classification::failed(
                    name.original.clone(),
                    ErrorKind::InternalBug,
                    "LLM adapter returned no result for a one-name batch",
                );
                failed.normalised_name = name.normalised.clone();
                failed
            },
        }
    }
}

fn finish(mut classification: Classification, started: Instant) -> Classification {
    classification.latency_ms = started.elapsed().as_millis() as u64;
    classification
}

fn store_failure(
    name: &NormalisedName,
    error: crate::services::learning::LearningError,
) -> Classification {
    tracing::error!("Learning store failure for '{}': {}", name.normalised, error);
    let mut failed =
        Classification::failed(name.original.clone(), ErrorKind::StoreIo, error.to_string());
    failed.normalised_name = name.normalised.clone();
    failed
}
