use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub runner: RunnerConfig,
    pub classifier: ClassifierConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Job database (executions, per-row results, locks).
    pub job_url: String,
    /// Learning database (LLM answers, learned patterns, phonetic families).
    pub learning_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Rows read and committed per batch (default: 100)
    pub batch_size: usize,
    /// Concurrent classifications inside a batch; 0 means number of cores
    pub worker_parallelism: usize,
    /// Grace window for in-flight rows on cancellation (default: 5000ms)
    pub grace_window_ms: u64,
    /// Micro-batch retry attempts per row for retryable errors (default: 3)
    pub retry_attempts: u32,
    /// Base delay for the exponential micro-batch backoff (default: 250ms)
    pub retry_backoff_ms: u64,
    /// Locks older than this with a non-running job are considered stale
    pub stale_lock_age_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence for a rule-layer answer (default: 0.8)
    pub rule_confidence_threshold: f64,
    /// Minimum confidence for a phonetic-layer answer (default: 0.65)
    pub phonetic_confidence_threshold: f64,
    /// Learned patterns below this measured accuracy are deactivated
    pub pattern_deactivation_floor: f64,
    /// Applications required before the deactivation floor is evaluated
    pub pattern_deactivation_min_applications: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Tag of the provider tried first
    pub primary: String,
    /// Tag of the failover provider
    pub secondary: String,
    /// Per-attempt request deadline (default: 20000ms)
    pub per_attempt_timeout_ms: u64,
    /// Total deadline for one batch of names (default: 120000ms)
    pub batch_deadline_ms: u64,
    /// Attempts per provider before failing over (default: 3)
    pub max_retries: u32,
    /// Names packed into one provider request (default: 20)
    pub max_names_per_request: usize,
    pub providers: Vec<LlmProviderConfig>,
}

/// One OpenAI-compatible provider endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
    pub tag: String,
    pub api_base: String,
    pub model_name: String,
    /// Filled from `APP_LLM_<TAG>_API_KEY` when empty in the file.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub cost_per_1k_input: f64,
    #[serde(default)]
    pub cost_per_1k_output: f64,
}

/// Global configuration flags shared by every CLI subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Job database URL (overrides config file)
    #[arg(long, global = true, value_name = "URL")]
    pub job_database_url: Option<String>,

    /// Learning database URL (overrides config file)
    #[arg(long, global = true, value_name = "URL")]
    pub learning_database_url: Option<String>,

    /// Logging level (overrides config file, e.g. "info,leadscope=debug")
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Rows per committed batch (overrides config file)
    #[arg(long, global = true, value_name = "ROWS")]
    pub batch_size: Option<usize>,

    /// Concurrent classifications inside a batch (overrides config file)
    #[arg(long, global = true, value_name = "N")]
    pub worker_parallelism: Option<usize>,

    /// Primary LLM provider tag (overrides config file)
    #[arg(long, global = true, value_name = "TAG")]
    pub llm_primary: Option<String>,

    /// Secondary LLM provider tag (overrides config file)
    #[arg(long, global = true, value_name = "TAG")]
    pub llm_secondary: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file
    /// support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, anyhow::Error> {
        let config_path = overrides.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - APP_JOB_DATABASE_URL: Job database URL
    /// - APP_LEARNING_DATABASE_URL: Learning database URL
    /// - APP_LOG_LEVEL: Logging level
    /// - APP_BATCH_SIZE: Rows per committed batch
    /// - APP_WORKER_PARALLELISM: Concurrent classifications inside a batch
    /// - APP_LLM_PRIMARY / APP_LLM_SECONDARY: Provider tags
    /// - APP_LLM_<TAG>_API_KEY: API key per configured provider
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("APP_JOB_DATABASE_URL") {
            self.database.job_url = url;
            tracing::info!("Override database.job_url from env");
        }

        if let Ok(url) = std::env::var("APP_LEARNING_DATABASE_URL") {
            self.database.learning_url = url;
            tracing::info!("Override database.learning_url from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(size) = std::env::var("APP_BATCH_SIZE")
            && let Ok(size) = size.parse()
        {
            self.runner.batch_size = size;
            tracing::info!("Override runner.batch_size from env: {}", self.runner.batch_size);
        }

        if let Ok(n) = std::env::var("APP_WORKER_PARALLELISM")
            && let Ok(n) = n.parse()
        {
            self.runner.worker_parallelism = n;
            tracing::info!(
                "Override runner.worker_parallelism from env: {}",
                self.runner.worker_parallelism
            );
        }

        if let Ok(tag) = std::env::var("APP_LLM_PRIMARY") {
            self.llm.primary = tag;
            tracing::info!("Override llm.primary from env: {}", self.llm.primary);
        }

        if let Ok(tag) = std::env::var("APP_LLM_SECONDARY") {
            self.llm.secondary = tag;
            tracing::info!("Override llm.secondary from env: {}", self.llm.secondary);
        }

        for provider in &mut self.llm.providers {
            let var = format!("APP_LLM_{}_API_KEY", provider.tag.to_uppercase());
            if let Ok(key) = std::env::var(&var)
                && !key.is_empty()
            {
                provider.api_key = key;
                tracing::info!("Override llm.providers[{}].api_key from env", provider.tag);
            }
        }
    }

    /// Apply command line argument overrides (highest priority).
    fn apply_cli_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.job_database_url {
            self.database.job_url = url.clone();
            tracing::info!("Override database.job_url from CLI");
        }

        if let Some(url) = &overrides.learning_database_url {
            self.database.learning_url = url.clone();
            tracing::info!("Override database.learning_url from CLI");
        }

        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(size) = overrides.batch_size {
            self.runner.batch_size = size;
            tracing::info!("Override runner.batch_size from CLI: {}", self.runner.batch_size);
        }

        if let Some(n) = overrides.worker_parallelism {
            self.runner.worker_parallelism = n;
            tracing::info!(
                "Override runner.worker_parallelism from CLI: {}",
                self.runner.worker_parallelism
            );
        }

        if let Some(tag) = &overrides.llm_primary {
            self.llm.primary = tag.clone();
            tracing::info!("Override llm.primary from CLI: {}", self.llm.primary);
        }

        if let Some(tag) = &overrides.llm_secondary {
            self.llm.secondary = tag.clone();
            tracing::info!("Override llm.secondary from CLI: {}", self.llm.secondary);
        }
    }

    /// Validate configuration.
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database.job_url.is_empty() {
            anyhow::bail!("Job database URL cannot be empty");
        }
        if self.database.learning_url.is_empty() {
            anyhow::bail!("Learning database URL cannot be empty");
        }
        if self.runner.batch_size == 0 {
            anyhow::bail!("runner.batch_size must be > 0");
        }
        if self.runner.retry_attempts == 0 {
            anyhow::bail!("runner.retry_attempts must be > 0");
        }

        for (name, value) in [
            ("classifier.rule_confidence_threshold", self.classifier.rule_confidence_threshold),
            (
                "classifier.phonetic_confidence_threshold",
                self.classifier.phonetic_confidence_threshold,
            ),
            ("classifier.pattern_deactivation_floor", self.classifier.pattern_deactivation_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        for tag in [&self.llm.primary, &self.llm.secondary] {
            if !tag.is_empty() && !self.llm.providers.iter().any(|p| &p.tag == tag) {
                anyhow::bail!("LLM provider '{}' is referenced but not configured", tag);
            }
        }

        Ok(())
    }

    /// Effective worker pool size (0 in config means number of cores).
    pub fn effective_parallelism(&self) -> usize {
        if self.runner.worker_parallelism > 0 {
            self.runner.worker_parallelism
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        }
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            job_url: "sqlite://data/leadscope-jobs.db".to_string(),
            learning_url: "sqlite://data/leadscope-learning.db".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,leadscope=debug".to_string(),
            file: Some("logs/leadscope.log".to_string()),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_parallelism: 0,
            grace_window_ms: 5_000,
            retry_attempts: 3,
            retry_backoff_ms: 250,
            stale_lock_age_secs: 3_600,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rule_confidence_threshold: 0.8,
            phonetic_confidence_threshold: 0.65,
            pattern_deactivation_floor: 0.6,
            pattern_deactivation_min_applications: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: String::new(),
            secondary: String::new(),
            per_attempt_timeout_ms: 20_000,
            batch_deadline_ms: 120_000,
            max_retries: 3,
            max_names_per_request: 20,
            providers: Vec::new(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    60
}
