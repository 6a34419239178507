//! `litharvest fetch`: stage two: materialize the deduplicated corpus

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use litharvest_core::{CancelToken, SharedProgress, fmt_num};
use litharvest_pipeline::coordinator::CollectStats;
use litharvest_pipeline::{BatchDownloader, CheckpointStore, RunReport, SharedIndex};

use crate::config::Config;

#[derive(Args)]
pub struct FetchArgs {
    /// Identifiers per batch (default from config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Restrict to one source (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,
}

pub fn run(
    args: FetchArgs,
    config: &Config,
    cancel: &CancelToken,
    progress: &SharedProgress,
) -> Result<ExitCode> {
    let sources = config.sources(&args.sources)?;
    let mut pipeline = config.pipeline(sources.clone(), None);
    if let Some(batch_size) = args.batch_size {
        pipeline.batch_size = batch_size.max(1);
    }

    let store = CheckpointStore::new(&pipeline.output_dir);
    let checkpoint = store
        .load()
        .context("no checkpoint found; run `litharvest collect` first")?;
    let index = SharedIndex::from_checkpoint(checkpoint);

    let client = config.client();
    let reverse = index.reverse_map();
    let mut downloader = BatchDownloader::new(&client, &pipeline)?;

    // The fetch-only report reflects the restored collection state
    let collect_stats = CollectStats {
        subjects_total: index.counters().processed,
        subjects_skipped: 0,
        counters: index.counters(),
        interrupted: false,
        elapsed: Duration::ZERO,
    };
    let mut report = RunReport::build(&index, &collect_stats);

    for source in sources {
        let ids = index.unique_ids_sorted(source);
        if ids.is_empty() {
            log::info!("{source}: nothing collected, skipping");
            continue;
        }
        log::info!("{source}: {} unique identifiers", fmt_num(ids.len()));

        let stats = downloader.materialize(source, &ids, &reverse, cancel, progress)?;
        report = report.with_download(source, stats);

        if cancel.is_cancelled() {
            break;
        }
    }

    report.log();
    let path = report.write(&pipeline.output_dir)?;
    log::info!("report written to {}", path.display());

    if report.interrupted {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
