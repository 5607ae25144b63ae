//! LLM adapter unit tests.
//!
//! Covers response parsing, confidence handling and the no-provider path.
//! Transport-level behaviour is exercised end-to-end by the runner tests.

use super::client::parse_response_content;
use super::*;
use crate::config::{LlmConfig, LlmProviderConfig};
use crate::models::Category;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_well_formed_payload() {
    let content = r#"{
        "classifications": [
            {"name": "XILUVA RIRHANDZU", "category": "african", "confidence": 0.85},
            {"name": "PRIYA PILLAY", "category": "indian", "confidence": 0.92}
        ]
    }"#;
    let answers =
        parse_response_content(content, &names(&["XILUVA RIRHANDZU", "PRIYA PILLAY"])).unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].category, Category::African);
    assert!((answers[0].confidence - 0.85).abs() < 1e-9);
    assert_eq!(answers[1].category, Category::Indian);
}

#[test]
fn rejects_count_mismatch() {
    let content = r#"{"classifications": [
        {"name": "A NAME", "category": "white", "confidence": 0.9}
    ]}"#;
    let err = parse_response_content(content, &names(&["A NAME", "B NAME"])).unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}

#[test]
fn rejects_unknown_category() {
    let content = r#"{"classifications": [
        {"name": "A NAME", "category": "martian", "confidence": 0.9}
    ]}"#;
    let err = parse_response_content(content, &names(&["A NAME"])).unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}

#[test]
fn rejects_name_mismatch() {
    let content = r#"{"classifications": [
        {"name": "SOMEONE ELSE", "category": "white", "confidence": 0.9}
    ]}"#;
    let err = parse_response_content(content, &names(&["A NAME"])).unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}

#[test]
fn rejects_non_json_content() {
    let err = parse_response_content("I think this is probably African.", &names(&["A NAME"]))
        .unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}

#[test]
fn rejects_out_of_range_confidence() {
    let content = r#"{"classifications": [
        {"name": "A NAME", "category": "white", "confidence": 1.7}
    ]}"#;
    let err = parse_response_content(content, &names(&["A NAME"])).unwrap_err();
    assert!(matches!(err, LlmError::Malformed(_)));
}

#[test]
fn low_confidence_answers_become_refusals() {
    let raw = super::client::RawAnswer {
        name: "A NAME".to_string(),
        category: Category::White,
        confidence: 0.4,
    };
    let err = super::service::accept_answer(raw, "primary", 0.0).unwrap_err();
    assert!(matches!(err, LlmError::Refused(_)));
}

#[test]
fn high_confidence_answers_are_capped() {
    let raw = super::client::RawAnswer {
        name: "A NAME".to_string(),
        category: Category::White,
        confidence: 0.99,
    };
    let answer = super::service::accept_answer(raw, "primary", 0.001).unwrap();
    assert!((answer.confidence - CONFIDENCE_CEILING).abs() < 1e-9);
    assert_eq!(answer.provider_tag, "primary");
    assert!((answer.cost - 0.001).abs() < 1e-12);
}

#[test]
fn floor_boundary_is_inclusive() {
    let raw = super::client::RawAnswer {
        name: "A NAME".to_string(),
        category: Category::African,
        confidence: CONFIDENCE_FLOOR,
    };
    let answer = super::service::accept_answer(raw, "primary", 0.0).unwrap();
    assert!((answer.confidence - CONFIDENCE_FLOOR).abs() < 1e-9);
}

#[test]
fn error_taxonomy_maps_to_kinds() {
    use crate::models::ErrorKind;
    assert_eq!(LlmError::RateLimited(30).kind(), ErrorKind::LlmRateLimited);
    assert_eq!(LlmError::Timeout(20_000).kind(), ErrorKind::LlmTimeout);
    assert_eq!(LlmError::Transport("boom".into()).kind(), ErrorKind::LlmTransport);
    assert_eq!(LlmError::Malformed("bad".into()).kind(), ErrorKind::LlmMalformed);
    assert_eq!(LlmError::Refused("low".into()).kind(), ErrorKind::LlmRefused);

    assert!(LlmError::RateLimited(30).is_retryable());
    assert!(LlmError::Timeout(1).is_retryable());
    assert!(!LlmError::Malformed("bad".into()).is_retryable());
    assert!(!LlmError::Refused("low".into()).is_retryable());
}

#[tokio::test]
async fn no_providers_refuses_every_name() {
    let adapter = LlmAdapter::new(&LlmConfig::default());
    assert!(!adapter.is_available());

    let results = adapter.classify_llm(&names(&["A NAME", "B NAME"])).await;
    assert_eq!(results.len(), 2);
    for result in results {
        assert!(matches!(result, Err(LlmError::NoProviderConfigured)));
    }
}

#[tokio::test]
async fn provider_chain_orders_primary_first() {
    let config = LlmConfig {
        primary: "beta".to_string(),
        secondary: "alpha".to_string(),
        providers: vec![
            LlmProviderConfig {
                tag: "alpha".to_string(),
                api_base: "https://alpha.example/v1".to_string(),
                model_name: "alpha-model".to_string(),
                api_key: "k".to_string(),
                requests_per_minute: 60,
                cost_per_1k_input: 0.0,
                cost_per_1k_output: 0.0,
            },
            LlmProviderConfig {
                tag: "beta".to_string(),
                api_base: "https://beta.example/v1".to_string(),
                model_name: "beta-model".to_string(),
                api_key: "k".to_string(),
                requests_per_minute: 60,
                cost_per_1k_input: 0.0,
                cost_per_1k_output: 0.0,
            },
        ],
        ..LlmConfig::default()
    };

    let adapter = LlmAdapter::new(&config);
    assert!(adapter.is_available());
    assert_eq!(adapter.primary_tag(), Some("beta"));
}
