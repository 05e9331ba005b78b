//! Ingestion pipeline binary entry point.
//!
//! This binary loads a BibTeX file into a catalog database and prints the
//! run report.
//!
//! # Examples
//!
//! Import into the default catalog:
//! ```bash
//! ingestion --input sbes2024.bib
//! ```
//!
//! Import into a specific database, reporting JSON:
//! ```bash
//! ingestion --input icse2023.bib --db-path catalog.db --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use event_catalog::{
    ingestion::{EntryOutcome, IngestionConfig, IngestionPipeline, TitleMatch},
    provider::{bibtex::BibtexProvider, BibliographyProvider},
    storage::sqlite::SqliteStore,
    DEFAULT_DB_FILE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Title deduplication policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum TitleMatchArg {
    /// Titles must be identical (default)
    Exact,
    /// Ignore case and whitespace differences
    Normalized,
}

impl From<TitleMatchArg> for TitleMatch {
    fn from(arg: TitleMatchArg) -> Self {
        match arg {
            TitleMatchArg::Exact => TitleMatch::Exact,
            TitleMatchArg::Normalized => TitleMatch::Normalized,
        }
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    /// Boxed summary (default)
    Summary,
    /// Run report as JSON on stdout
    Json,
}

/// Ingestion CLI for loading bibliographies into the event catalog
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Load BibTeX bibliographies into the event catalog",
    long_about = "Ingestion pipeline for BibTeX files: classifies venues, creates events and editions, and stores articles with title-based deduplication.

EXAMPLES:
  Import into the default catalog:
    ingestion --input sbes2024.bib

  Import into a specific database:
    CATALOG_DB=./catalog.db ingestion --input icse2023.bib

  Treat titles differing only in case or spacing as duplicates:
    ingestion --input papers.bib --title-match normalized

  JSON report and debug logging:
    ingestion --input papers.bib --format json --log-level debug"
)]
struct IngestionArgs {
    /// BibTeX file to import
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Database file path (defaults to the platform data directory)
    #[arg(long, value_name = "PATH", env = "CATALOG_DB")]
    db_path: Option<PathBuf>,

    /// How titles are compared for deduplication
    #[arg(long, value_enum, default_value = "exact")]
    title_match: TitleMatchArg,

    /// Domain used for synthesized author emails
    #[arg(long, value_name = "DOMAIN", default_value = "email.com")]
    email_domain: String,

    /// Report output format
    #[arg(long, value_enum, default_value = "summary")]
    format: ReportFormat,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", env = "CATALOG_LOG", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Resolve the database path, falling back to the platform data directory
fn resolve_db_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(path);
    }
    let data_dir = dirs::data_dir().context("No data directory on this platform; pass --db-path")?;
    Ok(data_dir.join("event-catalog").join(DEFAULT_DB_FILE))
}

/// Open the catalog database, creating its directory if needed
fn open_store(db_path: &Path) -> Result<SqliteStore> {
    debug!("Opening catalog at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }

    SqliteStore::open(db_path).with_context(|| format!("Failed to open catalog database {:?}", db_path))
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} entries | Created: {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = IngestionArgs::parse();

    // Initialize logging
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting catalog ingestion");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    // Validate input file exists
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }
    info!("Input file: {:?}", args.input);

    // Open storage
    let db_path = resolve_db_path(args.db_path.clone())?;
    let store = open_store(&db_path)?;
    info!("Database path: {:?}", db_path);

    let config = IngestionConfig {
        title_match: args.title_match.into(),
        email_domain: args.email_domain.clone(),
        ..IngestionConfig::default()
    };
    let pipeline = IngestionPipeline::with_config(store, config);

    // Parse the whole file before touching the store
    info!("Loading entries from {:?}...", args.input);
    let provider = BibtexProvider::from_file(&args.input)
        .await
        .with_context(|| format!("Failed to load bibliography from {:?}", args.input))?;
    let document = provider.document();
    for skipped in &document.skipped {
        warn!(
            "Skipping malformed entry {} at line {}: {}",
            skipped.key.as_deref().unwrap_or("?"),
            skipped.line,
            skipped.message
        );
    }
    let entries = document.entries;
    info!("Found {} entries in {}", entries.len(), provider.name());

    if entries.is_empty() {
        warn!("No entries found in input file");
    }

    let progress = create_progress_bar(entries.len())?;
    progress.set_message("0");
    let mut created = 0usize;

    let mut report = pipeline
        .ingest_entries_with_progress(&entries, |_, outcome| {
            if matches!(outcome, EntryOutcome::Created { .. }) {
                created += 1;
                progress.set_message(created.to_string());
            }
            progress.inc(1);
        })
        .await
        .context("Ingestion aborted")?;
    report.record_unparsed(&document.skipped);

    progress.finish_with_message(report.articles_created.to_string());

    match args.format {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{json}");
        }
        ReportFormat::Summary => {
            let elapsed = start_time.elapsed();
            println!("\n╔════════════════════════════════════════╗");
            println!("║      Ingestion Completed               ║");
            println!("╠════════════════════════════════════════╣");
            println!("║ Total entries:        {:>16} ║", report.total_entries);
            println!("║ Events created:       {:>16} ║", report.events_created);
            println!("║ Editions created:     {:>16} ║", report.editions_created);
            println!("║ Articles created:     {:>16} ║", report.articles_created);
            println!("║ Duplicates skipped:   {:>16} ║", report.duplicate_articles);
            println!("║ Failed:               {:>16} ║", report.failed());
            println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
            println!("╚════════════════════════════════════════╝");

            for failure in &report.errors {
                println!("  ! {}: {}", failure.entry_id, failure.message);
            }
        }
    }

    if report.failed() > 0 {
        warn!("{} entries failed to import - see the report for details", report.failed());
    }

    info!("Ingestion completed successfully");

    Ok(())
}
