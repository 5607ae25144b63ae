//! Deterministic rule classifier.
//!
//! Votes per-token against the curated dictionaries, with compound
//! surnames treated as a single unit. Returns `None` (abstention) whenever
//! nothing matched or the computed confidence misses the configured
//! threshold; abstention is not an error and the cascade continues.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Alternative, Category, Classification, Method};
use crate::services::dictionary::DictionaryStore;
use crate::services::normalizer::NormalisedName;

const BASE_CONFIDENCE: f64 = 0.85;
const PER_MATCH_BONUS: f64 = 0.05;
const CONFIDENCE_CAP: f64 = 0.95;
const DISAGREEMENT_CONFIDENCE: f64 = 0.75;

#[derive(Debug, Clone, Copy)]
struct Vote {
    category: Category,
    weight: f64,
    is_surname: bool,
}

pub struct RuleClassifier {
    dictionaries: Arc<DictionaryStore>,
    confidence_threshold: f64,
}

impl RuleClassifier {
    pub fn new(dictionaries: Arc<DictionaryStore>, confidence_threshold: f64) -> Self {
        Self { dictionaries, confidence_threshold }
    }

    /// Classify from normalised parts, or abstain.
    pub fn classify(&self, name: &NormalisedName) -> Option<Classification> {
        let tokens = name.folded_tokens();
        let mut votes: Vec<Vote> = Vec::new();

        // Surname vote: a compound pattern beats the plain last-token lookup
        let compound = self.dictionaries.match_compound(&tokens);
        let compound_span = compound.map(|(_, _, span)| span);

        if let Some((category, weight, _)) = compound {
            votes.push(Vote { category, weight, is_surname: true });
        } else if let Some(surname) = name.surname_part()
            && let Some((category, weight)) = self.dictionaries.lookup_surname(&surname.folded)
        {
            votes.push(Vote { category, weight, is_surname: true });
        }

        // Given-name votes for every significant token outside the surname
        for (idx, part) in name.parts.iter().enumerate() {
            if !part.is_significant() {
                continue;
            }
            if let Some(span) = compound_span
                && idx >= span.start
                && idx < span.end
            {
                continue;
            }
            if compound_span.is_none()
                && name.surname_part().map(|s| std::ptr::eq(s, part)).unwrap_or(false)
            {
                continue;
            }
            if let Some((category, weight)) = self.dictionaries.lookup_given(&part.folded) {
                votes.push(Vote { category, weight, is_surname: false });
            }
        }

        if votes.is_empty() {
            return None;
        }

        let (category, confidence, alternatives) = resolve(&votes);

        if confidence < self.confidence_threshold {
            tracing::debug!(
                "Rule layer abstains on '{}': confidence {:.2} below threshold {:.2}",
                name.normalised,
                confidence,
                self.confidence_threshold
            );
            return None;
        }

        Some(
            Classification::resolved(
                name.original.clone(),
                name.normalised.clone(),
                category,
                confidence,
                Method::Rule,
            )
            .with_alternatives(alternatives),
        )
    }
}

fn resolve(votes: &[Vote]) -> (Category, f64, Vec<Alternative>) {
    let categories: Vec<Category> = {
        let mut seen = Vec::new();
        for v in votes {
            if !seen.contains(&v.category) {
                seen.push(v.category);
            }
        }
        seen
    };

    // Unanimous: confidence grows with the number of matched tokens
    if categories.len() == 1 {
        let confidence =
            (BASE_CONFIDENCE + PER_MATCH_BONUS * votes.len() as f64).min(CONFIDENCE_CAP);
        return (categories[0], confidence, Vec::new());
    }

    // Disagreement: the surname vote outranks individual given-name votes;
    // without one, the heaviest aggregate wins.
    let winner = votes
        .iter()
        .find(|v| v.is_surname)
        .map(|v| v.category)
        .unwrap_or_else(|| {
            let mut totals: HashMap<Category, f64> = HashMap::new();
            for v in votes {
                *totals.entry(v.category).or_insert(0.0) += v.weight;
            }
            totals
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c)
                .unwrap_or(Category::Unknown)
        });

    let mut alternatives: Vec<Alternative> = Vec::new();
    for category in categories {
        if category != winner {
            let weight = votes
                .iter()
                .filter(|v| v.category == category)
                .map(|v| v.weight)
                .fold(0.0, f64::max);
            alternatives.push(Alternative { category, confidence: weight * 0.5 });
        }
    }

    (winner, DISAGREEMENT_CONFIDENCE, alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::normalizer::normalise;

    fn classifier() -> RuleClassifier {
        let store = Arc::new(DictionaryStore::load_embedded().unwrap());
        RuleClassifier::new(store, 0.8)
    }

    #[test]
    fn agreeing_given_and_surname() {
        let c = classifier();
        let result = c.classify(&normalise("Thabo Mthembu").unwrap()).unwrap();
        assert_eq!(result.category, Category::African);
        assert_eq!(result.method, Method::Rule);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn indian_and_cape_malay_names() {
        let c = classifier();
        let priya = c.classify(&normalise("Priya Pillay").unwrap()).unwrap();
        assert_eq!(priya.category, Category::Indian);
        let abdullah = c.classify(&normalise("Abdullah Cassiem").unwrap()).unwrap();
        assert_eq!(abdullah.category, Category::CapeMalay);
    }

    #[test]
    fn compound_surname_wins() {
        let c = classifier();
        let result = c.classify(&normalise("Pieter van der Merwe").unwrap()).unwrap();
        assert_eq!(result.category, Category::White);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn surname_only_match() {
        let c = classifier();
        let result = c.classify(&normalise("Unknownfirst Dlamini").unwrap()).unwrap();
        assert_eq!(result.category, Category::African);
        assert!((result.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn no_match_abstains() {
        let c = classifier();
        assert!(c.classify(&normalise("Xiluva Rirhandzu").unwrap()).is_none());
    }

    #[test]
    fn disagreement_below_threshold_abstains() {
        let c = classifier();
        // Indian given name with an African surname: surname precedence
        // would answer at 0.75, under the 0.8 threshold.
        assert!(c.classify(&normalise("Priya Dlamini").unwrap()).is_none());
    }

    #[test]
    fn disagreement_wins_with_lower_threshold() {
        let store = Arc::new(DictionaryStore::load_embedded().unwrap());
        let c = RuleClassifier::new(store, 0.7);
        let result = c.classify(&normalise("Priya Dlamini").unwrap()).unwrap();
        assert_eq!(result.category, Category::African);
        assert!((result.confidence - 0.75).abs() < 1e-9);
        assert_eq!(result.alternatives.len(), 1);
        assert_eq!(result.alternatives[0].category, Category::Indian);
    }

    #[test]
    fn six_token_compound_name() {
        let c = classifier();
        let result = c.classify(&normalise("ANDREAS PETRUS VAN DER MERWE JUNIOR").unwrap()).unwrap();
        assert_eq!(result.category, Category::White);
    }
}
