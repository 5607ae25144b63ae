use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadscope::config::{Config, ConfigOverrides};
use leadscope::services::{JobStoreError, RunOptions, RunnerError};
use leadscope::{CoreContext, JobStatus};

#[derive(Parser, Debug)]
#[command(name = "leadscope")]
#[command(version, about = "Leadscope - lead name classification pipeline")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start or resume a classification run over an input spreadsheet
    Run {
        /// Input spreadsheet (CSV or XLSX) with a director-name column
        input: PathBuf,

        /// Output file; defaults to "<input>_classified.csv"
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Input column carrying the name to classify
        #[arg(long, value_name = "COLUMN", default_value = "DirectorName")]
        name_column: String,

        /// Skip writing the output file after completion
        #[arg(long)]
        no_export: bool,
    },

    /// List recent jobs
    Jobs {
        #[arg(long, value_name = "N", default_value_t = 20)]
        limit: i64,
    },

    /// Export a job's results to its output file
    Export {
        job_id: String,

        /// Override the output path recorded on the job
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Input column carrying the name to classify
        #[arg(long, value_name = "COLUMN", default_value = "DirectorName")]
        name_column: String,
    },

    /// Cancel a running job
    Cancel { job_id: String },

    /// Release locks left behind by dead processes
    ReleaseLocks,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match Config::load(&cli.overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        },
    };

    init_tracing(&config);
    tracing::info!("Leadscope starting up");

    let context = match CoreContext::initialise(config).await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Initialisation failed: {}", e);
            std::process::exit(1);
        },
    };

    // SIGINT/SIGTERM request a graceful stop: in-flight rows get a grace
    // window, the partial batch is discarded, the job pauses resumably.
    {
        let context = context.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Cancellation requested; finishing in-flight rows");
                context.request_shutdown();
            }
        });
    }

    let exit_code = dispatch(&context, cli.command).await;
    std::process::exit(exit_code);
}

async fn dispatch(context: &CoreContext, command: Command) -> i32 {
    match command {
        Command::Run { input, output, name_column, no_export } => {
            let output = output.unwrap_or_else(|| default_output_path(&input));
            let mut options = RunOptions::new(input, output);
            options.name_column = name_column.clone();

            match context.run_job(&options).await {
                Ok(summary) => {
                    print_summary(&summary);
                    if summary.status == JobStatus::Completed && !no_export {
                        match context.export_job(&summary.job_id, None, &name_column).await {
                            Ok((path, rows)) => {
                                println!("Output written: {} ({} rows)", path.display(), rows);
                            },
                            Err(e) => {
                                tracing::error!("Export failed: {}", e);
                                return 1;
                            },
                        }
                    }
                    0
                },
                Err(RunnerError::Store(e @ JobStoreError::ConcurrentJob { .. })) => {
                    eprintln!("{}", e);
                    2
                },
                Err(e) => {
                    tracing::error!("Run failed: {}", e);
                    1
                },
            }
        },

        Command::Jobs { limit } => match context.list_jobs(limit).await {
            Ok(jobs) => {
                if jobs.is_empty() {
                    println!("No jobs recorded");
                } else {
                    println!(
                        "{:<38} {:<10} {:>9} {:>7} {:>8}  INPUT",
                        "JOB", "STATUS", "PROCESSED", "FAILED", "COST"
                    );
                    for job in jobs {
                        println!(
                            "{:<38} {:<10} {:>9} {:>7} {:>8.4}  {}",
                            job.job_id,
                            job.status,
                            job.processed_count,
                            job.failed_count,
                            job.cost_accum,
                            job.input_path
                        );
                    }
                }
                0
            },
            Err(e) => {
                tracing::error!("Listing jobs failed: {}", e);
                1
            },
        },

        Command::Export { job_id, output, name_column } => {
            match context.export_job(&job_id, output, &name_column).await {
                Ok((path, rows)) => {
                    println!("Output written: {} ({} rows)", path.display(), rows);
                    0
                },
                Err(e) => {
                    tracing::error!("Export failed: {}", e);
                    1
                },
            }
        },

        Command::Cancel { job_id } => match context.cancel_job(&job_id).await {
            Ok(()) => {
                println!("Job {} cancelled; it can be resumed later", job_id);
                0
            },
            Err(e) => {
                tracing::error!("Cancel failed: {}", e);
                1
            },
        },

        Command::ReleaseLocks => match context.release_stale_locks().await {
            Ok(released) => {
                println!("Released {} stale lock(s)", released);
                0
            },
            Err(e) => {
                tracing::error!("Releasing locks failed: {}", e);
                1
            },
        },
    }
}

fn default_output_path(input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_classified.csv", stem))
}

fn print_summary(summary: &leadscope::JobSummary) {
    println!("Job {} {}", summary.job_id, summary.status.as_str());
    println!(
        "  rows: {} processed, {} failed{}",
        summary.processed_count,
        summary.failed_count,
        summary
            .total_rows
            .map(|t| format!(" of {}", t))
            .unwrap_or_default()
    );
    if !summary.method_counts.is_empty() {
        let methods: Vec<String> = summary
            .method_counts
            .iter()
            .map(|(m, n)| format!("{} {}", n, m))
            .collect();
        println!("  methods: {}", methods.join(", "));
    }
    if !summary.error_counts.is_empty() {
        let errors: Vec<String> = summary
            .error_counts
            .iter()
            .map(|(k, n)| format!("{} {}", n, k))
            .collect();
        println!("  errors: {}", errors.join(", "));
    }
    println!(
        "  cost: {:.4}, time: {}ms, resumes: {}",
        summary.cost_accum, summary.time_accum_ms, summary.resume_count
    );
}

fn init_tracing(config: &Config) {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("leadscope.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the appender guard alive for the process lifetime
        std::mem::forget(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
