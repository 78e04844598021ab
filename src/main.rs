use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use gleaner::bus::NatsPublisher;
use gleaner::config::Config;
use gleaner::pipeline::{Pipeline, RunError, RunOutcome};
use gleaner::storage::Database;

// Distinct exit codes so an external scheduler can tell fatal conditions
// apart without parsing logs. A disabled source and an empty feed are clean
// (zero) exits; bootstrap failures (config, store open, bus connect) exit 1.
const EXIT_SOURCE_NOT_FOUND: u8 = 2;
const EXIT_AMBIGUOUS_SOURCE: u8 = 3;
const EXIT_FETCH_FAILED: u8 = 4;

#[derive(Parser, Debug)]
#[command(
    name = "gleaner",
    about = "Single-source feed-ingestion worker: dedupe RSS/Atom entries and publish collection events"
)]
struct Args {
    /// Source to ingest (falls back to SOURCEID env var, then config file)
    #[arg(long, value_name = "ID")]
    source_id: Option<String>,

    /// Config file path (default: ~/.config/gleaner/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// NATS server URL (overrides NATS_URL env var and config)
    #[arg(long, value_name = "URL")]
    nats_url: Option<String>,
}

/// Get the default config file path (~/.config/gleaner/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("gleaner")
        .join("config.toml"))
}

/// Assemble the pipeline's collaborators and execute one run.
///
/// The outer `Result` is bootstrap (config, store, bus connection), the inner
/// one the run itself, so `main` can map each to its own exit code.
async fn run(args: Args) -> Result<Result<RunOutcome, RunError>> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path().unwrap_or_else(|_| PathBuf::from("gleaner.toml")),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Precedence: CLI flag > environment > config file.
    let source_id = args
        .source_id
        .or_else(|| std::env::var("SOURCEID").ok())
        .or_else(|| config.source_id.clone())
        .context("No source id given (use --source-id, SOURCEID, or the config file)")?;

    let nats_url = args
        .nats_url
        .or_else(|| std::env::var("NATS_URL").ok())
        .unwrap_or_else(|| config.nats_url.clone());
    let database_path = args.database.unwrap_or_else(|| config.database_path.clone());

    let db = Database::open(&database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", database_path))?;

    let nats = async_nats::connect(&nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", nats_url))?;

    let pipeline = Pipeline::new(
        db,
        NatsPublisher::new(nats),
        reqwest::Client::new(),
        config.fetch_limits(),
    );

    Ok(pipeline.run(&source_id).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let outcome = match run(args).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Worker setup failed");
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(RunOutcome::Disabled) => {
            tracing::info!("Source is disabled, nothing to do");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::EmptyFeed) => ExitCode::SUCCESS,
        Ok(RunOutcome::Completed(report)) => {
            tracing::info!(
                inserted = report.inserted,
                duplicates = report.duplicates.len(),
                failed = report.failed,
                "Ingestion run finished"
            );
            ExitCode::SUCCESS
        }
        Err(e @ RunError::SourceNotFound(_)) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::from(EXIT_SOURCE_NOT_FOUND)
        }
        Err(e @ RunError::AmbiguousSource(_)) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::from(EXIT_AMBIGUOUS_SOURCE)
        }
        Err(e @ RunError::Fetch(_)) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::from(EXIT_FETCH_FAILED)
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}
