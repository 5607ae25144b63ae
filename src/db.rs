//! Database pool creation and schema migrations.
//!
//! Two single-file SQLite stores: the job database (executions, per-row
//! results, locks) and the learning database (LLM answers, learned
//! patterns, phonetic families). Both run in WAL mode so a single writer
//! can coexist with concurrent readers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

/// Create the job database pool and apply its migrations.
pub async fn create_job_pool(url: &str) -> Result<SqlitePool, anyhow::Error> {
    let pool = connect(url).await?;
    sqlx::migrate!("migrations/job").run(&pool).await?;
    Ok(pool)
}

/// Create the learning database pool and apply its migrations.
pub async fn create_learning_pool(url: &str) -> Result<SqlitePool, anyhow::Error> {
    let pool = connect(url).await?;
    sqlx::migrate!("migrations/learning").run(&pool).await?;
    Ok(pool)
}

async fn connect(url: &str) -> Result<SqlitePool, anyhow::Error> {
    ensure_parent_dir(url);

    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the directory for a `sqlite://path/to/file.db` URL if needed.
fn ensure_parent_dir(url: &str) {
    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    if path.starts_with(':') {
        // In-memory database
        return;
    }
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!("Failed to create database directory {}: {}", parent.display(), e);
    }
}
