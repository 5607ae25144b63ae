//! Phonetic classifier.
//!
//! Finds the nearest known name through codec agreement plus Jaro-Winkler
//! ranking. Candidates come from a derived in-memory index over the
//! curated dictionaries and from the persistent phonetic families the
//! learning store accumulates.

use std::sync::Arc;

use dashmap::DashMap;

use crate::models::{Category, Classification, Method};
use crate::services::dictionary::DictionaryStore;
use crate::services::learning::{LearningError, LearningStore};
use crate::services::normalizer::{NormalisedName, TokenRole};
use crate::services::phonetics::{self, PhoneticCodes};

/// Candidates must share at least this many codec codes with the query.
const MIN_CODEC_AGREEMENT: usize = 2;
/// Candidates below this similarity never rank.
const MIN_SIMILARITY: f64 = 0.85;
/// Strong-match thresholds (agreement >= 3).
const STRONG_SIMILARITY: f64 = 0.90;
/// Weak-match similarity floor (agreement == 2).
const WEAK_SIMILARITY: f64 = 0.92;

#[derive(Debug, Clone)]
struct IndexedName {
    token: String,
    category: Category,
    codes: PhoneticCodes,
}

#[derive(Debug, Clone)]
struct Candidate {
    category: Category,
    agreement: usize,
    similarity: f64,
}

pub struct PhoneticClassifier {
    learning: Arc<LearningStore>,
    /// (codec_id, code) -> dictionary tokens carrying that code.
    index: DashMap<(String, String), Vec<IndexedName>>,
    confidence_threshold: f64,
}

impl PhoneticClassifier {
    /// Build the classifier, deriving the in-memory family index from the
    /// curated dictionaries.
    pub fn new(
        dictionaries: &DictionaryStore,
        learning: Arc<LearningStore>,
        confidence_threshold: f64,
    ) -> Self {
        let index: DashMap<(String, String), Vec<IndexedName>> = DashMap::new();
        let mut indexed = 0usize;
        for (token, category) in dictionaries.all_tokens() {
            let codes = phonetics::encode(token);
            let entry = IndexedName { token: token.to_uppercase(), category, codes };
            for (codec_id, code) in entry.codes.entries() {
                index
                    .entry((codec_id.to_string(), code.to_string()))
                    .or_default()
                    .push(entry.clone());
            }
            indexed += 1;
        }
        tracing::debug!("Phonetic index built over {} dictionary tokens", indexed);

        Self { learning, index, confidence_threshold }
    }

    /// Classify from normalised parts, or abstain.
    pub async fn classify(
        &self,
        name: &NormalisedName,
    ) -> Result<Option<Classification>, LearningError> {
        let mut surname_result: Option<(Category, f64)> = None;
        let mut best_result: Option<(Category, f64, f64)> = None;

        for part in name.significant_parts() {
            let Some(candidate) = self.best_candidate(&part.folded).await? else {
                continue;
            };

            let Some(confidence) = confidence_for(&candidate) else {
                continue;
            };
            if confidence < self.confidence_threshold {
                continue;
            }

            // The surname token is authoritative when tokens disagree
            if part.role == TokenRole::Surname {
                surname_result = Some((candidate.category, confidence));
            }
            let replace = match &best_result {
                None => true,
                Some((_, best_conf, best_sim)) => {
                    confidence > *best_conf
                        || (confidence == *best_conf && candidate.similarity > *best_sim)
                },
            };
            if replace {
                best_result = Some((candidate.category, confidence, candidate.similarity));
            }
        }

        let resolved = surname_result.or(best_result.map(|(c, conf, _)| (c, conf)));

        Ok(resolved.map(|(category, confidence)| {
            Classification::resolved(
                name.original.clone(),
                name.normalised.clone(),
                category,
                confidence,
                Method::Phonetic,
            )
        }))
    }

    /// Best candidate for one folded token, ranked by similarity among
    /// those sharing enough codec codes.
    async fn best_candidate(&self, token: &str) -> Result<Option<Candidate>, LearningError> {
        let query_codes = phonetics::encode(token);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen: Vec<(String, Category)> = Vec::new();

        let mut consider = |candidate_token: &str, category: Category, codes: &PhoneticCodes| {
            let key = (candidate_token.to_string(), category);
            if seen.contains(&key) {
                return;
            }
            seen.push(key);

            let agreement = query_codes.agreement_count(codes);
            if agreement < MIN_CODEC_AGREEMENT {
                return;
            }
            let similarity = phonetics::similarity(token, candidate_token);
            if similarity < MIN_SIMILARITY {
                return;
            }
            candidates.push(Candidate { category, agreement, similarity });
        };

        // Dictionary-derived index
        for (codec_id, code) in query_codes.entries() {
            if let Some(matches) = self.index.get(&(codec_id.to_string(), code.to_string())) {
                for entry in matches.iter() {
                    consider(&entry.token, entry.category, &entry.codes);
                }
            }
        }

        // Learned phonetic families
        for (codec_id, code) in query_codes.entries() {
            for family in self.learning.lookup_phonetic_family(codec_id, code).await? {
                let category = family.category_enum();
                for representative in family.representative_tokens() {
                    let codes = phonetics::encode(&representative);
                    consider(&representative, category, &codes);
                }
            }
        }

        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(candidates.into_iter().next())
    }
}

/// Confidence ladder over agreement and similarity.
fn confidence_for(candidate: &Candidate) -> Option<f64> {
    if candidate.agreement >= 3 && candidate.similarity >= STRONG_SIMILARITY {
        let confidence = 0.70 + 0.05 * (candidate.agreement as f64 - 3.0);
        Some(confidence.min(0.90))
    } else if candidate.agreement == 2 && candidate.similarity >= WEAK_SIMILARITY {
        Some(0.65)
    } else {
        None
    }
}
