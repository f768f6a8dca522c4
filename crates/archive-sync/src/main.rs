use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use archive_sync::search::Pagination;
use archive_sync::{load_config, telemetry, ArchiveSync, OperatorContext};

#[derive(Parser, Debug)]
#[command(name = "archive-sync", version, about = "Archive ingestion and search synchronisation")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "ARCHIVE_SYNC_CONFIG", default_value = "archive-sync.json")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Operator recorded in jobs and the audit log.
    #[arg(long, env = "ARCHIVE_SYNC_OPERATOR")]
    operator: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every PDF below a folder.
    Import { dir: PathBuf },
    /// Enrich records from a CSV file.
    Enrich {
        csv: PathBuf,
        /// Run both validation phases without committing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the progress of an import job.
    Job { id: String },
    /// Search records.
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        page_size: u64,
    },
    /// Write the canonical search index settings.
    ConfigureIndex,
    /// Re-index every enriched record.
    Reindex,
    /// Show search index statistics.
    Stats,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init_logging(cli.json_logs) {
        eprintln!("logging already initialised: {}", e);
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config '{}'", cli.config.display()))?;
    let operator = cli
        .operator
        .clone()
        .unwrap_or_else(|| config.import.operator.clone());
    let ctx = OperatorContext::new(operator, None);
    let app = ArchiveSync::open(config).context("failed to open archive store")?;

    match cli.command {
        Command::Import { dir } => {
            let batch = app.import.import_folder(&dir, &ctx)?;
            info!(batch_id = %batch.batch_id, files = batch.jobs.len(), "Import started");
            let report = batch.wait().await;
            print_json(&report)?;
        }
        Command::Enrich { csv, dry_run } => {
            let content = tokio::fs::read_to_string(&csv)
                .await
                .with_context(|| format!("failed to read '{}'", csv.display()))?;
            let filename = csv
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.csv".to_string());

            let staged = app.enrichment.validate_format(&filename, &content)?;
            print_json(&staged)?;
            if !staged.report.valid {
                app.enrichment.discard(&staged.batch_id);
                bail!("CSV format validation failed");
            }

            let existence = app.enrichment.validate_existence(&staged.batch_id)?;
            print_json(&existence)?;
            if !existence.passed() {
                app.enrichment.discard(&staged.batch_id);
                bail!("{} archive numbers do not exist", existence.not_exist_count);
            }

            if dry_run {
                app.enrichment.discard(&staged.batch_id);
                info!("Dry run: nothing committed");
                return Ok(());
            }

            let commit = app.enrichment.commit(&staged.batch_id, &ctx)?;
            let job_id = commit.job_id.clone();
            commit.wait().await;
            app.flush_index().await;
            print_json(&app.enrichment.progress(&job_id)?)?;
        }
        Command::Job { id } => {
            print_json(&app.tracker.progress(&id)?)?;
        }
        Command::Search {
            query,
            page,
            page_size,
        } => {
            let response = app
                .router
                .search(&query, Pagination::new(page, page_size))
                .await?;
            print_json(&response)?;
        }
        Command::ConfigureIndex => {
            app.synchronizer.configure_index().await?;
            println!("index settings applied");
        }
        Command::Reindex => {
            let report = app.synchronizer.reindex_all(&app.db).await?;
            print_json(&report)?;
        }
        Command::Stats => {
            print_json(&app.synchronizer.stats().await?)?;
        }
    }

    Ok(())
}
