//! Learning store tests: immediate learning, pattern ranking and the
//! deactivation policy.

use crate::models::{Category, Classification, Method};
use crate::services::learning::PatternKind;
use crate::services::normalizer::normalise;
use crate::services::phonetics;
use crate::tests::common::create_learning_store;

fn llm_classification(name: &str, category: Category, confidence: f64) -> Classification {
    Classification::resolved(name, name, category, confidence, Method::Llm)
        .with_provider("test-provider")
}

#[tokio::test]
async fn recorded_answer_is_visible_to_exact_lookup() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();
    let classification =
        llm_classification(&name.normalised, Category::African, 0.85);

    store.record_llm_answer(&name, &classification, Some("job-1")).await.unwrap();

    let hit = store.lookup_exact(&name.normalised).await.unwrap().expect("cache hit");
    assert_eq!(hit.category, Category::African);
    assert_eq!(hit.method, Method::Cache);
    assert!((hit.confidence - 0.85).abs() < 1e-9);
    assert_eq!(hit.provider.as_deref(), Some("test-provider"));
}

#[tokio::test]
async fn unknown_name_misses_cache() {
    let store = create_learning_store().await;
    assert!(store.lookup_exact("NOBODY KNOWS").await.unwrap().is_none());
}

#[tokio::test]
async fn every_codec_family_contains_the_learned_category() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();
    let classification = llm_classification(&name.normalised, Category::African, 0.85);

    store.record_llm_answer(&name, &classification, None).await.unwrap();

    for part in name.significant_parts() {
        let codes = phonetics::encode(&part.folded);
        for (codec_id, code) in codes.entries() {
            let families = store.lookup_phonetic_family(codec_id, code).await.unwrap();
            assert!(
                families.iter().any(|f| f.category_enum() == Category::African),
                "family {}/{} missing african entry",
                codec_id,
                code
            );
        }
    }
}

#[tokio::test]
async fn learned_prefix_matches_new_name() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();
    let classification = llm_classification(&name.normalised, Category::African, 0.85);
    store.record_llm_answer(&name, &classification, None).await.unwrap();

    // XILANI shares the XIL prefix learned from XILUVA
    let matched = store
        .match_learned_affix("XILANI DUBE")
        .await
        .unwrap()
        .expect("affix match");
    assert_eq!(matched.category, Category::African);
    assert_eq!(matched.kind, PatternKind::AffixPrefix3);
    assert_eq!(matched.value, "XIL");
    assert!((matched.confidence - 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn three_char_affixes_outrank_two_char() {
    let store = create_learning_store().await;

    // Learn a name whose 2-char prefix also exists under another category
    let first = normalise("XILUVA RIRHANDZU").unwrap();
    store
        .record_llm_answer(&first, &llm_classification(&first.normalised, Category::African, 0.85), None)
        .await
        .unwrap();

    // A query matching only the 2-char affix still resolves, at rank 2
    let weak = store.match_learned_affix("XINAVANE").await.unwrap().expect("2-char match");
    assert_eq!(weak.kind, PatternKind::AffixPrefix2);
    assert_eq!(weak.value, "XI");

    // A query matching the 3-char affix prefers it
    let strong = store.match_learned_affix("XILO").await.unwrap().expect("3-char match");
    assert_eq!(strong.kind, PatternKind::AffixPrefix3);
}

#[tokio::test]
async fn repeated_answers_accumulate_evidence() {
    let store = create_learning_store().await;
    for raw in ["XILUVA DUBE", "XILANI KHUMALO"] {
        let name = normalise(raw).unwrap();
        store
            .record_llm_answer(&name, &llm_classification(&name.normalised, Category::African, 0.85), None)
            .await
            .unwrap();
    }

    let matched = store.match_learned_affix("XILO").await.unwrap().expect("match");
    assert_eq!(matched.value, "XIL");

    let row = sqlx::query_as::<_, crate::services::learning::LearnedPattern>(
        "SELECT * FROM learned_patterns WHERE kind = 'affix_prefix_3' AND value = 'XIL'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(row.evidence_count, 2);
}

#[tokio::test]
async fn deactivated_patterns_are_never_returned() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();
    store
        .record_llm_answer(&name, &llm_classification(&name.normalised, Category::African, 0.85), None)
        .await
        .unwrap();

    let matched = store.match_learned_affix("XILO").await.unwrap().expect("match");

    // 20 applications, all judged wrong, sinks accuracy to 0.0
    for _ in 0..20 {
        store.record_application(matched.pattern_id, Some(false)).await.unwrap();
    }

    let row = sqlx::query_as::<_, crate::services::learning::LearnedPattern>(
        "SELECT * FROM learned_patterns WHERE id = ?",
    )
    .bind(matched.pattern_id)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert!(!row.active, "pattern should be deactivated");

    // XILO previously matched the XIL prefix; with the 3-char pattern dead
    // it may fall back to a weaker one, but never to the deactivated row
    if let Some(again) = store.match_learned_affix("XILO").await.unwrap() {
        assert_ne!(again.pattern_id, matched.pattern_id);
    }
}

#[tokio::test]
async fn accurate_patterns_stay_active() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();
    store
        .record_llm_answer(&name, &llm_classification(&name.normalised, Category::African, 0.85), None)
        .await
        .unwrap();

    let matched = store.match_learned_affix("XILO").await.unwrap().expect("match");
    for i in 0..30 {
        // 80% accuracy, comfortably above the 0.6 floor
        store
            .record_application(matched.pattern_id, Some(i % 5 != 0))
            .await
            .unwrap();
    }

    let again = store.match_learned_affix("XILO").await.unwrap().expect("still active");
    assert_eq!(again.pattern_id, matched.pattern_id);
}

#[tokio::test]
async fn full_name_cache_upserts_latest_answer() {
    let store = create_learning_store().await;
    let name = normalise("XILUVA RIRHANDZU").unwrap();

    store
        .record_llm_answer(&name, &llm_classification(&name.normalised, Category::African, 0.7), None)
        .await
        .unwrap();
    store
        .record_llm_answer(&name, &llm_classification(&name.normalised, Category::African, 0.9), None)
        .await
        .unwrap();

    let hit = store.lookup_exact(&name.normalised).await.unwrap().unwrap();
    assert!((hit.confidence - 0.9).abs() < 1e-9);

    // Both immutable answer records remain
    let answers = store.llm_answers(&name.normalised).await.unwrap();
    assert_eq!(answers.len(), 2);
}
