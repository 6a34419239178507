//! litharvest - Disease literature harvester
//!
//! Collects record identifiers for a worklist of disease names from the
//! PubMed and PMC catalogs, deduplicates them into one corpus, and
//! materializes full records in rate-limited batches. Runs survive
//! restarts via checkpoints.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use litharvest_core::CancelToken;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "litharvest")]
#[command(about = "Harvest disease literature from PubMed and PMC")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./litharvest.toml or ~/.config/litharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect identifiers, then materialize the deduplicated corpus
    Run(cmd::run::RunArgs),
    /// Stage one only: collect and deduplicate identifiers
    Collect(cmd::collect::CollectArgs),
    /// Stage two only: materialize records from the last checkpoint
    Fetch(cmd::fetch::FetchArgs),
    /// Derive a flat CSV from the materialized batch documents
    Export(cmd::export::ExportArgs),
    /// Show checkpoint and materialization progress
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(litharvest_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress bars show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    litharvest_core::init_logging(quiet, cli.debug, multi);

    match run(cli, progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, progress: Arc<litharvest_core::ProgressContext>) -> Result<ExitCode> {
    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // SIGINT/SIGTERM request a cooperative stop; in-flight work finishes
    // its page, then the pipeline flushes a checkpoint and report
    let cancel = CancelToken::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, cancel.as_flag())?;
    }

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &cancel, &progress),
        Command::Collect(args) => cmd::collect::run(args, &config, &cancel, &progress),
        Command::Fetch(args) => cmd::fetch::run(args, &config, &cancel, &progress),
        Command::Export(args) => cmd::export::run(args, &config),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            cmd::status::print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}
