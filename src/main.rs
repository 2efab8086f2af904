//! rigscan - Test-Rig Sensor Log Anomaly Scoring
//!
//! Trains baseline profiles from known-good rig logs and scores new logs
//! against them.
//!
//! # Usage
//!
//! ```bash
//! # Train a new profile version from known-good runs
//! rigscan train --store ./profiles --label commissioning runs/good_*.txt
//!
//! # Score files against the latest profile (one JSON report per file)
//! rigscan score --store ./profiles --pretty runs/today_*.txt
//!
//! # List stored versions and their staleness
//! rigscan inspect --store ./profiles
//!
//! # Configuration helpers
//! rigscan init-config rigscan.toml
//! rigscan check-config rigscan.toml
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: info)
//! - `RIGSCAN_CONFIG`: Configuration file used when `--config` is not given
//! - `RIGSCAN_STORE`: Profile store directory used when `--store` is not given

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use rigscan::{BaselineModel, ModelState, Pipeline, PipelineConfig, ProfileStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rigscan")]
#[command(about = "Test-rig sensor log anomaly scoring")]
#[command(version)]
struct CliArgs {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true, env = "RIGSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Train a new baseline profile version from known-good logs
    Train {
        /// Profile store directory
        #[arg(long, env = "RIGSCAN_STORE", default_value = "./profiles")]
        store: PathBuf,
        /// Free-text label stored with the profile
        #[arg(long)]
        label: Option<String>,
        /// Known-good log files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Score logs against the latest stored profile
    Score {
        /// Profile store directory
        #[arg(long, env = "RIGSCAN_STORE", default_value = "./profiles")]
        store: PathBuf,
        /// Per-file deadline in milliseconds, checked between windows
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Pretty-print the JSON reports
        #[arg(long)]
        pretty: bool,
        /// Log files to score
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List stored profile versions
    Inspect {
        /// Profile store directory
        #[arg(long, env = "RIGSCAN_STORE", default_value = "./profiles")]
        store: PathBuf,
    },

    /// Validate a configuration file and print warnings
    CheckConfig {
        file: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        file: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => {
            info!("No config file given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

fn run_train(config: PipelineConfig, store: &Path, label: Option<String>, files: &[PathBuf]) -> Result<()> {
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config, Arc::clone(&model))?;

    let profile = pipeline
        .train_from_files(files, label)
        .context("Training failed")?;

    let store = ProfileStore::new(store);
    let metadata = store.save(&profile).context("Failed to store profile")?;

    println!("Stored profile version {}", metadata.version);
    if let Some(base) = &metadata.based_on {
        println!("  based on:  {base}");
    }
    for (channel, count) in &metadata.channels {
        println!("  {channel:<32} {count:>6} windows");
    }
    Ok(())
}

fn run_score(
    config: PipelineConfig,
    store: &Path,
    deadline_ms: Option<u64>,
    pretty: bool,
    files: &[PathBuf],
) -> Result<()> {
    let (version, profile) = ProfileStore::new(store)
        .latest()
        .with_context(|| format!("No usable profile in {}", store.display()))?;
    info!(version = %version, "Using baseline profile");

    let model = Arc::new(BaselineModel::from_profile(profile));
    let pipeline = Pipeline::new(config, model)?;

    let results = match deadline_ms {
        Some(ms) => files
            .iter()
            .map(|f| pipeline.score_with_deadline(f, Instant::now() + Duration::from_millis(ms)))
            .collect(),
        None => pipeline.score_batch(files),
    };

    let mut failures = 0usize;
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(report) => {
                let json = if pretty {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };
                println!("{json}");
            }
            Err(e) => {
                error!(path = %file.display(), error = %e, "Scoring failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files could not be scored", files.len());
    }
    Ok(())
}

fn run_inspect(config: &PipelineConfig, store: &Path) -> Result<()> {
    let store = ProfileStore::new(store);
    let versions = store.list_versions()?;
    if versions.is_empty() {
        println!("No profiles stored in {}", store.root().display());
        return Ok(());
    }

    let horizon = config.baseline.staleness_horizon();
    let now = Utc::now();
    for version in &versions {
        let metadata = store.metadata(version)?;
        let profile = store.load(version)?;
        let state = if profile.is_stale(now, horizon) {
            ModelState::Stale
        } else {
            ModelState::Trained
        }
        .to_string();
        println!(
            "{version}  {state:<9}  trained {}  channels {}  {}",
            metadata.trained_at.format("%Y-%m-%d %H:%M:%S"),
            metadata.channels.len(),
            metadata.label.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let (_, warnings) = PipelineConfig::from_toml_str_with_warnings(&contents)?;
    for w in &warnings {
        println!("warning: {w}");
    }
    println!("{} is valid", path.display());
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PipelineConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    match args.command {
        SubCommand::Train { store, label, files } => {
            let config = load_config(args.config.as_deref())?;
            run_train(config, &store, label, &files)
        }
        SubCommand::Score {
            store,
            deadline_ms,
            pretty,
            files,
        } => {
            let config = load_config(args.config.as_deref())?;
            run_score(config, &store, deadline_ms, pretty, &files)
        }
        SubCommand::Inspect { store } => {
            let config = load_config(args.config.as_deref())?;
            run_inspect(&config, &store)
        }
        SubCommand::CheckConfig { file } => run_check_config(&file),
        SubCommand::InitConfig { file, force } => {
            if args.config.is_some() {
                warn!("--config is ignored by init-config");
            }
            run_init_config(&file, force)
        }
    }
}
