//! `litharvest collect`: stage one, identifier collection and dedup

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use litharvest_core::{CancelToken, SharedProgress};
use litharvest_pipeline::{CheckpointStore, RunReport, SharedIndex, run_collection};

use crate::config::Config;

#[derive(Args)]
pub struct CollectArgs {
    /// Subject list file, one disease name per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Worker threads (default from config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Process at most N subjects from the head of the list
    #[arg(long)]
    pub limit: Option<usize>,

    /// Restrict to one source (repeatable: --source pubmed --source pmc)
    #[arg(long = "source")]
    pub sources: Vec<String>,
}

pub fn run(
    args: CollectArgs,
    config: &Config,
    cancel: &CancelToken,
    progress: &SharedProgress,
) -> Result<ExitCode> {
    let sources = config.sources(&args.sources)?;
    let pipeline = config.pipeline(sources, args.workers);

    std::fs::create_dir_all(&pipeline.output_dir).with_context(|| {
        format!("failed to create output dir {}", pipeline.output_dir.display())
    })?;

    let subjects = super::load_subjects(&args.input, args.limit)?;
    let client = config.client();

    let store = CheckpointStore::new(&pipeline.output_dir);
    let index = match store.load() {
        Some(cp) => SharedIndex::from_checkpoint(cp),
        None => SharedIndex::new(),
    };

    log::info!(
        "collecting {} subjects with {} workers ({})",
        subjects.len(),
        pipeline.workers,
        if client.has_api_key() {
            "keyed rate budget"
        } else {
            "anonymous rate budget"
        }
    );

    let stats = run_collection(
        &subjects, &client, &pipeline, &index, &store, cancel, progress,
    )?;

    let report = RunReport::build(&index, &stats);
    report.log();
    let path = report.write(&pipeline.output_dir)?;
    log::info!("report written to {}", path.display());

    if stats.interrupted {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
