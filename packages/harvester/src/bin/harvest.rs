//! Harvest CLI
//!
//! Runs listing batches, compacts append logs and splits descriptor files
//! into monthly batches. Configuration comes from `HARVEST_*` environment
//! variables (and `.env`); flags override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use harvester::{
    batch_key_from_path, compact, load_descriptors, split_by_month, write_month_files,
    BatchPaths, HarvestConfig, HarvestError, Harvester, ListingDescriptor, RunSummary,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Harvest job listings into crash-safe NDJSON logs and JSON snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and store every listing of an input file
    Run {
        /// JSON array of listing descriptors
        #[arg(long)]
        input: PathBuf,

        /// Directory for append logs and snapshots
        #[arg(long)]
        output_dir: PathBuf,

        /// Batch key (default: input file stem)
        #[arg(long, conflicts_with = "by_month")]
        batch: Option<String>,

        /// One batch per YYYY-MM of the descriptors' dates
        #[arg(long)]
        by_month: bool,

        /// Leave the append log uncompacted
        #[arg(long)]
        no_compact: bool,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Rebuild a batch snapshot from its append log
    Compact {
        #[arg(long)]
        output_dir: PathBuf,

        #[arg(long)]
        batch: String,
    },

    /// Split a descriptor file into links_<YYYY-MM>.json files
    Split {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output_dir: PathBuf,
    },
}

/// Flags that take precedence over `HARVEST_*` variables.
#[derive(Args, Default)]
struct ConfigOverrides {
    /// Worker pool width
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Total fetch attempts per listing
    #[arg(long)]
    max_retries: Option<u32>,

    /// Completions between checkpoints
    #[arg(long)]
    reclaim_interval: Option<usize>,
}

impl ConfigOverrides {
    fn apply(&self, mut config: HarvestConfig) -> HarvestConfig {
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(max_retries) = self.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let Some(interval) = self.reclaim_interval {
            config = config.with_reclaim_interval(interval);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,harvester=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            batch,
            by_month,
            no_compact,
            overrides,
        } => {
            let config = overrides.apply(
                HarvestConfig::from_env().context("Failed to load HARVEST_* configuration")?,
            );
            config.validate().context("Invalid configuration")?;
            run(config, &input, &output_dir, batch, by_month, !no_compact).await
        }
        Commands::Compact { output_dir, batch } => {
            let paths = BatchPaths::new(&output_dir, &batch);
            let report = compact(&paths)
                .await
                .with_context(|| format!("Failed to compact batch {batch}"))?;
            tracing::info!(
                snapshot = %paths.snapshot.display(),
                records = report.records,
                malformed_lines = report.malformed_lines,
                "Compaction complete"
            );
            Ok(())
        }
        Commands::Split { input, output_dir } => {
            let descriptors = load_descriptors(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let batches = split_by_month(descriptors);
            let written = write_month_files(&output_dir, &batches)
                .await
                .context("Failed to write month files")?;
            tracing::info!(files = written.len(), "Split complete");
            Ok(())
        }
    }
}

async fn run(
    config: HarvestConfig,
    input: &Path,
    output_dir: &Path,
    batch: Option<String>,
    by_month: bool,
    compact_on_finish: bool,
) -> Result<()> {
    let descriptors = load_descriptors(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let batches: Vec<(String, Vec<ListingDescriptor>)> = if by_month {
        split_by_month(descriptors).into_iter().collect()
    } else {
        let key = batch.unwrap_or_else(|| batch_key_from_path(input));
        vec![(key, descriptors)]
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after in-flight listings");
            ctrl_c.cancel();
        }
    });

    let harvester = Harvester::new(config)
        .with_cancellation(cancel)
        .with_compaction(compact_on_finish);

    for (key, descriptors) in batches {
        tracing::info!(batch = %key, listings = descriptors.len(), "Processing batch");
        let paths = BatchPaths::new(output_dir, &key);

        match harvester.run(descriptors, &paths).await {
            Ok(summary) => report(&key, &summary),
            Err(HarvestError::Cancelled) => {
                tracing::warn!(batch = %key, "Stopped; re-run to resume");
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("Batch {key} failed")),
        }
    }

    Ok(())
}

fn report(batch: &str, summary: &RunSummary) {
    tracing::info!(
        batch = %batch,
        total = summary.total,
        appended = summary.appended,
        skipped_duplicate = summary.skipped_duplicate,
        failed = summary.failed,
        invalid = summary.invalid,
        records_with_unknown_sections = summary.records_with_unknown_sections,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Batch complete"
    );
}
