// Common test utilities and helpers

use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::config::{ClassifierConfig, LlmConfig};
use crate::services::classifier::ClassifierOrchestrator;
use crate::services::dictionary::DictionaryStore;
use crate::services::job_store::JobStore;
use crate::services::learning::LearningStore;
use crate::services::llm::{LlmAdapter, LlmBackend};
use crate::services::phonetic_match::PhoneticClassifier;
use crate::services::rules::RuleClassifier;

/// Create an in-memory job database with the full schema.
pub async fn create_job_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test job database");

    sqlx::migrate!("migrations/job")
        .run(&pool)
        .await
        .expect("Failed to run job migrations");

    pool
}

/// Create an in-memory learning database with the full schema.
pub async fn create_learning_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test learning database");

    sqlx::migrate!("migrations/learning")
        .run(&pool)
        .await
        .expect("Failed to run learning migrations");

    pool
}

/// Create a file-backed job database inside a temp directory, for tests
/// that exercise concurrent access.
pub async fn create_job_db_at(path: &std::path::Path) -> SqlitePool {
    let url = format!("sqlite://{}", path.display());
    crate::db::create_job_pool(&url)
        .await
        .expect("Failed to create file-backed job database")
}

/// Create a file-backed learning database inside a temp directory.
pub async fn create_learning_db_at(path: &std::path::Path) -> SqlitePool {
    let url = format!("sqlite://{}", path.display());
    crate::db::create_learning_pool(&url)
        .await
        .expect("Failed to create file-backed learning database")
}

/// Learning store over an in-memory database with default thresholds.
pub async fn create_learning_store() -> Arc<LearningStore> {
    let defaults = ClassifierConfig::default();
    Arc::new(LearningStore::new(
        create_learning_db().await,
        defaults.pattern_deactivation_floor,
        defaults.pattern_deactivation_min_applications,
    ))
}

/// Full orchestrator over a given learning store, with no LLM providers
/// configured (the LLM layer reports transport failure).
pub fn create_orchestrator(learning: Arc<LearningStore>) -> Arc<ClassifierOrchestrator> {
    create_orchestrator_with_backend(learning, Arc::new(LlmAdapter::new(&LlmConfig::default())))
}

/// Full orchestrator with a caller-supplied LLM backend.
pub fn create_orchestrator_with_backend(
    learning: Arc<LearningStore>,
    llm: Arc<dyn LlmBackend>,
) -> Arc<ClassifierOrchestrator> {
    let defaults = ClassifierConfig::default();
    let dictionaries = Arc::new(DictionaryStore::load_embedded().expect("dictionaries"));
    let rules =
        RuleClassifier::new(Arc::clone(&dictionaries), defaults.rule_confidence_threshold);
    let phonetic = PhoneticClassifier::new(
        &dictionaries,
        Arc::clone(&learning),
        defaults.phonetic_confidence_threshold,
    );
    Arc::new(ClassifierOrchestrator::new(rules, phonetic, learning, llm))
}

/// Job store over an in-memory database.
pub async fn create_job_store() -> Arc<JobStore> {
    Arc::new(JobStore::new(create_job_db().await))
}

/// Write a CSV input file with a DirectorName column.
pub fn write_input_csv(path: &std::path::Path, names: &[&str]) {
    let mut content = String::from("LeadId,DirectorName,Company\n");
    for (i, name) in names.iter().enumerate() {
        content.push_str(&format!("L{:04},{},Company {}\n", i, name, i));
    }
    std::fs::write(path, content).expect("Failed to write input CSV");
}
