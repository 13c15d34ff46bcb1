//! Jot command line
//!
//! Works on extraction records stored as JSON files:
//! - `triage` lists the items that need a human look
//! - `review` walks through them on the terminal and prints the patched record
//! - `upload` promotes a record's tasks into the tracker, skipping duplicates
//!
//! Results go to stdout as JSON; prompts and logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jot_core::{build_orchestrator, tracker_from_env, Pipeline, PipelineConfig, TaskTracker};
use jot_record::{ExtractionRecord, PageType, SchemaRegistry};
use jot_review::{patch, triage, ReviewProgress, ReviewSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "jot.toml";
const CANCEL_COMMAND: &str = ":cancel";

/// Command-line arguments for jot
#[derive(Parser, Debug)]
#[command(name = "jot")]
#[command(about = "Promote scanned journal pages into a task tracker")]
#[command(version)]
struct Args {
    /// Configuration file, `jot.toml` in the working directory when present
    #[arg(short, long, global = true, env = "JOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List low-confidence items of a record
    Triage {
        /// Extraction record (JSON)
        file: PathBuf,
        /// Page layout of the record
        #[arg(short, long, default_value = "unknown")]
        page_type: PageType,
        /// Override the configured confidence threshold
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Review low-confidence items interactively and print the patched record
    Review {
        /// Extraction record (JSON)
        file: PathBuf,
        /// Page layout of the record
        #[arg(short, long, default_value = "unknown")]
        page_type: PageType,
        /// Write the patched record here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create the record's tasks in the tracker
    Upload {
        /// Extraction record (JSON)
        file: PathBuf,
        /// Page layout of the record
        #[arg(short, long, default_value = "unknown")]
        page_type: PageType,
        /// Report duplicate decisions without creating anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let json = args.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    match args.command {
        Command::Triage {
            file,
            page_type,
            threshold,
        } => run_triage(config, &file, page_type, threshold).await,
        Command::Review {
            file,
            page_type,
            output,
        } => run_review(&config, &file, page_type, output.as_deref()).await,
        Command::Upload {
            file,
            page_type,
            dry_run,
        } => run_upload(config, &file, page_type, dry_run).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => PipelineConfig::load(Path::new(DEFAULT_CONFIG))
            .context("Failed to load jot.toml"),
        None => Ok(PipelineConfig::default()),
    }
}

async fn read_record(path: &Path) -> Result<ExtractionRecord> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ExtractionRecord::from_json(&text)
        .with_context(|| format!("{} is not an extraction record", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_triage(
    mut config: PipelineConfig,
    file: &Path,
    page_type: PageType,
    threshold: Option<f64>,
) -> Result<()> {
    if let Some(threshold) = threshold {
        config = config.with_confidence_threshold(threshold);
        config.validate()?;
    }
    let record = read_record(file).await?;
    let registry = SchemaRegistry::builtin();
    let flagged = triage::flag_with_schema(
        &record,
        registry.get(page_type),
        config.confidence_threshold,
    )?;
    info!("{} item(s) below {}", flagged.len(), config.confidence_threshold);
    print_json(&flagged)
}

async fn run_review(
    config: &PipelineConfig,
    file: &Path,
    page_type: PageType,
    output: Option<&Path>,
) -> Result<()> {
    let record = read_record(file).await?;
    let registry = SchemaRegistry::builtin();
    let flagged = triage::flag_with_schema(
        &record,
        registry.get(page_type),
        config.confidence_threshold,
    )?;
    if flagged.is_empty() {
        eprintln!("Nothing to review.");
        return write_record(&record, output).await;
    }

    let mut session = ReviewSession::new();
    let mut next = session.start(flagged, record)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Press Enter to accept, type a correction, or {CANCEL_COMMAND} to stop.");

    loop {
        eprintln!(
            "[{}/{}] {}[{}] confidence {:.2}",
            next.position, next.total, next.section, next.index, next.confidence
        );
        eprint!("  {}\n> ", next.text);
        std::io::stderr().flush()?;

        let Some(answer) = lines.next_line().await? else {
            session.cancel()?;
            bail!("input closed before the review finished");
        };
        if answer.trim() == CANCEL_COMMAND {
            let discarded = session.cancel()?;
            eprintln!("Review cancelled, {discarded} item(s) discarded.");
            return Ok(());
        }

        let text = if answer.trim().is_empty() {
            next.text.clone()
        } else {
            answer
        };
        match session.submit(&text)? {
            ReviewProgress::Next { next_item } => next = next_item,
            ReviewProgress::Completed { reviewed_count } => {
                eprintln!("Reviewed {reviewed_count} item(s).");
                break;
            }
        }
    }

    let completed = session.take_completed()?;
    let outcome = patch::apply(&completed.source, &completed.reviewed);
    for error in &outcome.errors {
        warn!("Correction not applied: {}", error);
    }
    write_record(&outcome.record, output).await
}

async fn write_record(record: &ExtractionRecord, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let text = serde_json::to_string_pretty(record)?;
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Patched record written to {}", path.display());
            Ok(())
        }
        None => print_json(record),
    }
}

async fn run_upload(
    config: PipelineConfig,
    file: &Path,
    page_type: PageType,
    dry_run: bool,
) -> Result<()> {
    let record = read_record(file).await?;

    if dry_run {
        let tracker = tracker_from_env(&config)?;
        let orchestrator = build_orchestrator(&config, Arc::clone(&tracker)).await?;
        let registry = SchemaRegistry::builtin();
        let schema = registry.get(page_type);
        schema.validate(&record)?;

        let candidates = schema.candidate_tasks(&record);
        let scope = schema.due_hint(&record);
        let existing = tracker
            .list_existing_tasks(&scope)
            .await
            .with_context(|| format!("Failed to list tasks for '{scope}'"))?;
        let report = orchestrator.check_duplicates(&candidates, &existing).await;
        info!(
            "{} of {} candidate(s) already exist in '{}'",
            report.duplicate_count(),
            candidates.len(),
            scope
        );
        return print_json(&report);
    }

    let pipeline = Pipeline::from_config(config)
        .await
        .context("Failed to set up the pipeline")?;
    let session = pipeline.create_session().await;
    let ingested = pipeline.ingest(session, page_type, record).await?;
    if ingested.needs_review() {
        warn!(
            "{} low-confidence item(s) uploaded unreviewed, run `jot review` first to correct them",
            ingested.flagged
        );
    }

    let report = pipeline.promote(session).await?;
    pipeline.end_session(session).await;
    eprintln!("{}", report.upload.summary());
    print_json(&report.upload)
}
