//! politica-etl - Electoral records loader CLI
//!
//! Loads parties, politicians, candidacies and vote tallies from JSON-lines
//! files into the SQLite store. Each command prints (or logs) the run
//! summary; only a run that cannot start exits non-zero.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use politica_common::config::{self, EtlSettings, SettingsOverrides, StatusPolicy};
use politica_etl::models::{party_catalog, CandidacyRow, LoadSummary, PartyRow, PoliticianRow};
use politica_etl::{source, LoadOptions, Loader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for politica-etl
#[derive(Parser, Debug)]
#[command(name = "politica-etl")]
#[command(about = "Electoral records loader")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config_dir>/politica/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "POLITICA_DATABASE")]
    database: Option<PathBuf>,

    /// Rows per chunk and per upsert transaction
    #[arg(long, global = true, env = "POLITICA_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Concurrent load workers
    #[arg(long, global = true, env = "MAX_WORKERS")]
    workers: Option<usize>,

    /// Status kept when a candidate's tallies disagree (last_wins, first_wins)
    #[arg(long, global = true, env = "POLITICA_STATUS_POLICY")]
    status_policy: Option<StatusPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true, env = "POLITICA_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Print summaries as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the built-in catalog of registered parties
    SeedParties,
    /// Load party rows
    LoadParties {
        /// JSON-lines file of party rows
        file: PathBuf,
    },
    /// Load politician rows
    LoadPoliticians {
        /// JSON-lines file of politician rows
        file: PathBuf,
    },
    /// Load candidacy rows for one election year
    LoadCandidacies {
        /// JSON-lines file of candidacy rows
        file: PathBuf,
        #[arg(long)]
        year: i32,
    },
    /// Aggregate vote partitions and merge the totals into candidacies
    MergeVotes {
        /// Directory of JSON-lines tally files, one per partition
        dir: PathBuf,
    },
    /// Load a full year: parties and politicians derived from the candidacy
    /// file, then candidacies, then vote totals
    Run {
        #[arg(long)]
        candidacies: PathBuf,
        #[arg(long)]
        votes: PathBuf,
        #[arg(long)]
        year: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Resolve settings (CLI/env over TOML over defaults)
    let toml_config = config::load_or_default(args.config.as_deref())
        .context("Failed to load config file")?;
    let overrides = SettingsOverrides {
        database_path: args.database.clone(),
        batch_size: args.batch_size,
        max_workers: args.workers,
        status_policy: args.status_policy,
        log_level: args.log_level.clone(),
        log_directory: args.log_dir.clone(),
    };
    let settings = EtlSettings::resolve(overrides, &toml_config).context("Invalid settings")?;

    // Step 2: Initialize tracing
    init_tracing(&settings)?;

    info!("Starting politica-etl");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", settings.database_path.display());
    info!(
        batch_size = settings.batch_size,
        max_workers = settings.max_workers,
        status_policy = ?settings.status_policy,
        "Load settings"
    );

    // Step 3: Open or create database (one connection per worker plus one)
    let max_connections = u32::try_from(settings.max_workers + 1).unwrap_or(u32::MAX);
    let pool = politica_common::db::init_database(&settings.database_path, max_connections)
        .await
        .context("Failed to open database")?;

    let loader = Loader::new(pool.clone(), LoadOptions::from(&settings));

    // Step 4: Execute command
    let summaries = match args.command {
        Command::SeedParties => vec![loader.load_parties(party_catalog::builtin_parties()).await?],
        Command::LoadParties { file } => {
            let rows: Vec<PartyRow> = read_rows(&file)?;
            vec![loader.load_parties(rows).await?]
        }
        Command::LoadPoliticians { file } => {
            let rows: Vec<PoliticianRow> = read_rows(&file)?;
            vec![loader.load_politicians(rows).await?]
        }
        Command::LoadCandidacies { file, year } => {
            let rows: Vec<CandidacyRow> = read_rows(&file)?;
            vec![loader.load_candidacies(rows, year).await?]
        }
        Command::MergeVotes { dir } => {
            let partitions = source::read_partitions(&dir)
                .with_context(|| format!("Failed to read vote partitions from {}", dir.display()))?;
            vec![loader.merge_vote_results(partitions).await?]
        }
        Command::Run {
            candidacies,
            votes,
            year,
        } => {
            let rows: Vec<CandidacyRow> = read_rows(&candidacies)?;
            let partitions = source::read_partitions(&votes)
                .with_context(|| format!("Failed to read vote partitions from {}", votes.display()))?;
            loader.load_year(rows, partitions, year).await?
        }
    };

    report(&summaries, args.json)?;

    pool.close().await;
    Ok(())
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let rows = source::read_json_lines(path)
        .with_context(|| format!("Failed to read rows from {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "Rows read");
    Ok(rows)
}

/// Console layer always; ANSI-free file layer when a log directory is set
fn init_tracing(settings: &EtlSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "politica_etl={level},politica_common={level},sqlx=warn",
            level = settings.log_level
        ))
    });

    let file_layer = match &settings.log_directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let name = format!("etl_run_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
            let file = File::create(dir.join(&name))
                .with_context(|| format!("Failed to create log file {}", name))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn report(summaries: &[LoadSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    for summary in summaries {
        info!(
            "{}: {} inserted, {} updated, {} skipped ({} rows committed, {} ms)",
            summary.operation,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.processed,
            summary.elapsed_ms
        );
        if summary.status_conflicts > 0 {
            info!("{}: {} conflicting status reports", summary.operation, summary.status_conflicts);
        }
        if summary.lost_races > 0 {
            info!(
                "{}: {} creates resolved to rows stored concurrently",
                summary.operation, summary.lost_races
            );
        }
        for issue in &summary.row_issues {
            warn!(row = issue.row, key = %issue.key, issue = ?issue.kind, "Row skipped");
        }
        for error in &summary.chunk_errors {
            warn!(
                chunk = error.chunk,
                first_row = error.first_row,
                end_row = error.end_row,
                error = %error.message,
                "Chunk rolled back"
            );
        }
    }

    Ok(())
}
