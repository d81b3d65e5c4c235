//! IQDB Mirror - catalog to similarity index ingestion tool

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use mirror_common::logging::{init_logging, LogConfig, LogLevel};
use mirror_ingest::checkpoint::CheckpointStore;
use mirror_ingest::config::{Credentials, FailurePolicy, IngestConfig};
use mirror_ingest::fingerprint::fingerprint_bytes;
use mirror_ingest::http::build_client;
use mirror_ingest::orchestrator::{ExportSource, Pipeline};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "iqdb-mirror")]
#[command(author, version, about = "Mirror a media catalog into an IQDB similarity index")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index every catalog item not yet recorded in the checkpoint
    Run(RunArgs),

    /// Print the submission body for a single image
    Fingerprint {
        /// Image URL or local file path
        source: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Base URL of the IQDB service
    #[arg(short = 'i', long = "iqdb", env = "MIRROR_INDEX_URL")]
    index_url: String,

    /// Metadata API user, needed to index deleted items
    #[arg(short = 'u', long = "api-user", env = "MIRROR_API_USER")]
    api_user: Option<String>,

    /// Metadata API key, needed to index deleted items
    #[arg(short = 'k', long = "api-key", env = "MIRROR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use an already downloaded, uncompressed export
    #[arg(short = 'e', long = "export", conflicts_with = "date")]
    export: Option<PathBuf>,

    /// Export day to download (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Contact (site username or email) appended to the User-Agent
    #[arg(long, env = "MIRROR_USER_AGENT_CONTACT")]
    contact: Option<String>,

    /// Number of concurrent workers
    #[arg(long, env = "MIRROR_POOL_SIZE")]
    workers: Option<usize>,

    /// Checkpoint file location
    #[arg(long, env = "MIRROR_CHECKPOINT_PATH")]
    checkpoint: Option<PathBuf>,

    /// What to do when a single item fails: abort or skip
    #[arg(long, env = "MIRROR_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("iqdb-mirror")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Fingerprint { source } => fingerprint(&source).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = IngestConfig::from_env()?;
    config.index_url = args.index_url;

    if args.api_user.is_some() != args.api_key.is_some() {
        warn!("Both an API user and an API key are needed to index deleted items");
    }
    config.credentials = Credentials::from_parts(args.api_user, args.api_key);

    if let Some(contact) = args.contact {
        config.user_agent_contact = Some(contact);
    }
    if config.user_agent_contact.is_none() {
        warn!("No User-Agent contact configured; set --contact so the API operators can reach you");
    }
    if let Some(workers) = args.workers {
        config.pool_size = workers;
    }
    if let Some(path) = args.checkpoint {
        config.checkpoint_path = path;
    }
    if let Some(policy) = args.failure_policy {
        config.failure_policy = policy;
    }
    config.validate()?;

    let source = match args.export {
        Some(path) => ExportSource::Local(path),
        None => ExportSource::Remote(
            args.date.unwrap_or_else(|| chrono::Local::now().date_naive()),
        ),
    };

    let work_dir = tempfile::TempDir::new().context("Failed to create work directory")?;
    let store = CheckpointStore::new(config.checkpoint_path.clone());
    let pipeline = Pipeline::new(&config, &store)?;

    info!("Mirroring into {}", config.index_url);
    let summary = pipeline.execute(source, work_dir.path()).await?;

    info!(
        "Mirror complete: {} processed, {} rejected by the index, {} failed, {} unresolved",
        summary.active + summary.deleted,
        summary.rejected,
        summary.failed,
        summary.unresolved
    );
    Ok(())
}

async fn fingerprint(source: &str) -> Result<()> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        let client = build_client(&IngestConfig::from_env()?)?;
        let response = client.get(source).send().await?.error_for_status()?;
        response.bytes().await?.to_vec()
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read {}", source))?
    };

    let fingerprint = tokio::task::spawn_blocking(move || fingerprint_bytes(&bytes)).await??;
    println!("{}", serde_json::to_string(&fingerprint.envelope())?);
    Ok(())
}
