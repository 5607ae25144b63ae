//! Phonetic classifier tests: codec-agreement matching over dictionary
//! and learned candidates, thresholds and surname authority.

use std::sync::Arc;

use crate::models::{Category, Classification, Method};
use crate::services::dictionary::DictionaryStore;
use crate::services::normalizer::normalise;
use crate::services::phonetic_match::PhoneticClassifier;
use crate::tests::common::create_learning_store;

async fn classifier() -> PhoneticClassifier {
    let dictionaries = Arc::new(DictionaryStore::load_embedded().unwrap());
    PhoneticClassifier::new(&dictionaries, create_learning_store().await, 0.65)
}

#[tokio::test]
async fn close_variant_of_curated_surname_matches() {
    let c = classifier().await;
    // PILLAI is one letter off the curated PILLAY and shares most codecs
    let result = c
        .classify(&normalise("Sagren Pillai").unwrap())
        .await
        .unwrap()
        .expect("phonetic match");
    assert_eq!(result.category, Category::Indian);
    assert_eq!(result.method, Method::Phonetic);
    assert!(result.confidence >= 0.65);
}

#[tokio::test]
async fn surname_token_is_authoritative() {
    let c = classifier().await;
    // JOHAN matches the white given name exactly; the surname variant
    // still decides the outcome
    let result = c
        .classify(&normalise("Johan Pillai").unwrap())
        .await
        .unwrap()
        .expect("phonetic match");
    assert_eq!(result.category, Category::Indian);
}

#[tokio::test]
async fn dissimilar_names_abstain() {
    let c = classifier().await;
    assert!(c.classify(&normalise("Qwltx Zzyxv").unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn learned_families_supply_candidates() {
    let dictionaries = Arc::new(DictionaryStore::load_embedded().unwrap());
    let learning = create_learning_store().await;
    let c = PhoneticClassifier::new(&dictionaries, Arc::clone(&learning), 0.65);

    // Unknown to the dictionaries and to the families: abstain
    let query = normalise("Xiluvo Rirhandzo").unwrap();
    assert!(c.classify(&query).await.unwrap().is_none());

    // Learn a near-identical name, then the same query resolves through
    // the stored phonetic families
    let learned = normalise("Xiluva Rirhandza").unwrap();
    let answer = Classification::resolved(
        &learned.normalised,
        &learned.normalised,
        Category::African,
        0.85,
        Method::Llm,
    )
    .with_provider("test-provider");
    learning.record_llm_answer(&learned, &answer, None).await.unwrap();

    let result = c.classify(&query).await.unwrap().expect("family match");
    assert_eq!(result.category, Category::African);
    assert_eq!(result.method, Method::Phonetic);
}
