//! Leadscope Library
//!
//! Classification and learning engine for tabular business-lead records:
//! a cascading name classifier (cache, rules, phonetics, LLM), an
//! immediate-learning store and a resumable batch runner.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::watch;

pub mod config;
pub mod db;
pub mod embedded;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use models::{
    Category, Classification, ErrorKind, JobExecution, JobStatus, JobSummary, LeadRecord,
    LeadResult, Method, Outcome, ProcessingStatus,
};
pub use services::{
    BatchRunner, ClassifierOrchestrator, DictionaryStore, JobStore, LearningStore, LlmAdapter,
    PhoneticClassifier, RuleClassifier, RunOptions, RunnerError,
};

/// Everything the pipeline needs, built once at startup and passed
/// explicitly.
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI
/// container. All services are wrapped in Arc for cheap cloning and thread
/// safety; the only process-wide serialiser is the learning store's
/// explicit write lock.
#[derive(Clone)]
pub struct CoreContext {
    pub config: Config,

    pub job_db: SqlitePool,
    pub learning_db: SqlitePool,

    pub dictionaries: Arc<DictionaryStore>,
    pub learning_store: Arc<LearningStore>,
    pub llm: Arc<LlmAdapter>,
    pub orchestrator: Arc<ClassifierOrchestrator>,
    pub job_store: Arc<JobStore>,

    shutdown: watch::Sender<bool>,
}

impl CoreContext {
    /// Open both databases, load the dictionaries and wire every service.
    pub async fn initialise(config: Config) -> Result<Self, anyhow::Error> {
        let job_db = db::create_job_pool(&config.database.job_url).await?;
        let learning_db = db::create_learning_pool(&config.database.learning_url).await?;
        tracing::info!("Database pools created successfully");

        let dictionaries = Arc::new(DictionaryStore::load_embedded()?);

        let learning_store = Arc::new(LearningStore::new(
            learning_db.clone(),
            config.classifier.pattern_deactivation_floor,
            config.classifier.pattern_deactivation_min_applications,
        ));

        let llm = Arc::new(LlmAdapter::new(&config.llm));
        let llm_backend: Arc<dyn services::llm::LlmBackend> = Arc::clone(&llm) as Arc<dyn services::llm::LlmBackend>;

        let rules = RuleClassifier::new(
            Arc::clone(&dictionaries),
            config.classifier.rule_confidence_threshold,
        );
        let phonetic = PhoneticClassifier::new(
            &dictionaries,
            Arc::clone(&learning_store),
            config.classifier.phonetic_confidence_threshold,
        );

        let orchestrator = Arc::new(ClassifierOrchestrator::new(
            rules,
            phonetic,
            Arc::clone(&learning_store),
            llm_backend,
        ));

        let job_store = Arc::new(JobStore::new(job_db.clone()));

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            job_db,
            learning_db,
            dictionaries,
            learning_store,
            llm,
            orchestrator,
            job_store,
            shutdown,
        })
    }

    /// Subscribe to the cancellation signal.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Request a graceful stop: runners finish in-flight rows up to the
    /// grace window and pause without committing the partial batch.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Classify a single name through the full cascade.
    pub async fn classify(&self, name: &str) -> Classification {
        self.orchestrator.classify(name).await
    }

    /// Run (or resume) a batch job over one input file.
    pub async fn run_job(&self, options: &RunOptions) -> Result<JobSummary, RunnerError> {
        let runner = BatchRunner::new(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.job_store),
            self.config.runner.clone(),
            self.config.effective_parallelism(),
            self.shutdown_signal(),
        );
        runner.run(options).await
    }

    /// Recent jobs, newest first.
    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<JobExecution>, RunnerError> {
        Ok(self.job_store.list_jobs(limit).await?)
    }

    /// Write a job's output file from its committed results. Safe to call
    /// any time after the rows landed, including long after completion.
    pub async fn export_job(
        &self,
        job_id: &str,
        output_path: Option<PathBuf>,
        name_column: &str,
    ) -> Result<(PathBuf, u64), RunnerError> {
        let job = self.job_store.get_job(job_id).await?;
        let results = self.job_store.job_results(job_id).await?;
        let output = output_path.unwrap_or_else(|| PathBuf::from(&job.output_path));

        let written = services::write_output(
            std::path::Path::new(&job.input_path),
            &output,
            name_column,
            &results,
        )?;
        tracing::info!("Exported {} rows for job {} to {}", written, job_id, output.display());
        Ok((output, written))
    }

    /// Cancel a running job. The owning runner stops at its next commit.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), RunnerError> {
        Ok(self.job_store.cancel_job(job_id).await?)
    }

    /// Administrative: clear locks left behind by dead processes.
    pub async fn release_stale_locks(&self) -> Result<u64, RunnerError> {
        Ok(self
            .job_store
            .release_stale_locks(self.config.runner.stale_lock_age_secs)
            .await?)
    }
}
