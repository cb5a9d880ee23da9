//! Article Imagery CLI
//!
//! The `imagery` command runs the image collection & curation pipeline.
//!
//! ## Commands
//!
//! - `pool`: aggregate the producers of a run file and print the pool summary
//! - `run`: rank, resolve, upload and place images for one article

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imagery_core::{
    ArticleImageryRequest, CancelSignal, ClarityValidator, CurationConfig, FsImageStore,
    ImageryOutcome, ImageryPipeline, IngestReport, PoolSummary, QualityGates, Resolver,
};
use imagery_http::{ChatRankingClient, HttpImageFetcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "imagery")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect, curate and place article images", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the producers of a run file and print the pool summary (no network)
    Pool {
        /// Run file (JSON `ArticleImageryRequest`)
        #[arg(short, long)]
        input: PathBuf,

        /// Curation config file (JSON); defaults plus IMAGERY_* env when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the full pipeline for one article
    Run {
        /// Run file (JSON `ArticleImageryRequest`)
        #[arg(short, long)]
        input: PathBuf,

        /// Curation config file (JSON); defaults plus IMAGERY_* env when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory the uploaded images are written to
        #[arg(long, env = "IMAGERY_STORE_DIR")]
        store_dir: PathBuf,

        /// Public URL prefix under which `store_dir` is served
        #[arg(long, env = "IMAGERY_PUBLIC_BASE_URL")]
        public_base_url: String,

        /// Write the full outcome JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the clarity check on hero candidates
        #[arg(long)]
        no_clarity_check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    imagery_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Pool { input, config } => cmd_pool(&input, config.as_deref()),
        Commands::Run {
            input,
            config,
            store_dir,
            public_base_url,
            output,
            no_clarity_check,
        } => {
            cmd_run(
                &input,
                config.as_deref(),
                &store_dir,
                &public_base_url,
                output.as_deref(),
                !no_clarity_check,
            )
            .await
        }
    }
}

fn load_request(path: &Path) -> Result<ArticleImageryRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Run file {} is not a valid imagery request", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<CurationConfig> {
    let config = match path {
        Some(path) => CurationConfig::from_json_file(path)?,
        None => CurationConfig::from_env(),
    };
    config.validate().context("Invalid curation config")?;
    Ok(config)
}

#[derive(Serialize)]
struct PoolReport {
    summary: PoolSummary,
    ingest: IngestReport,
}

fn cmd_pool(input: &Path, config: Option<&Path>) -> Result<()> {
    let request = load_request(input)?;
    let config = load_config(config)?;

    let (pool, ingest) = request.aggregate(&config);
    let report = PoolReport {
        summary: pool.summarize(),
        ingest,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_run(
    input: &Path,
    config: Option<&Path>,
    store_dir: &Path,
    public_base_url: &str,
    output: Option<&Path>,
    clarity_check: bool,
) -> Result<()> {
    let request = load_request(input)?;
    let config = load_config(config)?;

    let fetcher = HttpImageFetcher::from_env().context("Failed to build image fetcher")?;
    let ranking = ChatRankingClient::from_env().context("Failed to build ranking client")?;
    let store = FsImageStore::new(store_dir, public_base_url)
        .with_context(|| format!("Failed to open image store at {}", store_dir.display()))?;

    let quality = if clarity_check {
        QualityGates {
            hero: Some(Arc::new(ClarityValidator::default())),
            section: None,
        }
    } else {
        QualityGates::default()
    };
    let resolver = Resolver::new(Arc::new(fetcher), &config).with_quality_gates(quality);
    let pipeline = ImageryPipeline::new(Arc::new(ranking), resolver, Arc::new(store), config);

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight work");
            on_interrupt.cancel();
        }
    });

    let outcome = pipeline.run(&request, &cancel).await;
    print_summary(&outcome);

    let json = serde_json::to_string_pretty(&outcome)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write outcome to {}", path.display()))?;
            info!(path = %path.display(), "outcome written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_summary(outcome: &ImageryOutcome) {
    eprintln!("Run {}", outcome.run_id);
    eprintln!(
        "  pool:      {} images ({} catalog, {} web, {} extracted)",
        outcome.pool.total, outcome.pool.catalog, outcome.pool.web, outcome.pool.extracted
    );
    eprintln!(
        "  curation:  {} ({} calls, ${:.4})",
        outcome.curation_status.as_str(),
        outcome.usage.calls,
        outcome.usage.cost_usd
    );
    match &outcome.featured {
        Some(featured) => eprintln!("  featured:  {}", featured.url),
        None => eprintln!("  featured:  none"),
    }
    eprintln!(
        "  sections:  {} placed, {} unplaced, {} upload failures",
        outcome.placed.len(),
        outcome.unplaced.len(),
        outcome.upload_failures.len()
    );
    if outcome.cancelled {
        eprintln!("  cancelled before completion");
    }
}
