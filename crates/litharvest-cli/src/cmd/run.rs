//! `litharvest run`: collect identifiers, then materialize records

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use litharvest_core::{CancelToken, SharedProgress, fmt_num};
use litharvest_pipeline::{
    BatchDownloader, CheckpointStore, RunReport, SharedIndex, run_collection,
};

use crate::config::Config;

#[derive(Args)]
pub struct RunArgs {
    /// Subject list file, one disease name per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Worker threads for the collection phase
    #[arg(long)]
    pub workers: Option<usize>,

    /// Process at most N subjects from the head of the list
    #[arg(long)]
    pub limit: Option<usize>,

    /// Restrict to one source (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Also derive the flat CSV export after materialization
    #[arg(long)]
    pub export_csv: bool,
}

pub fn run(
    args: RunArgs,
    config: &Config,
    cancel: &CancelToken,
    progress: &SharedProgress,
) -> Result<ExitCode> {
    let sources = config.sources(&args.sources)?;
    let pipeline = config.pipeline(sources.clone(), args.workers);

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

    // Stage one: parallel collection into the shared index
    let collect_stats = run_collection(
        &subjects, &client, &pipeline, &index, &store, cancel, progress,
    )?;
    let mut report = RunReport::build(&index, &collect_stats);

    // Stage two: sequential materialization of the deduplicated corpus
    if cancel.is_cancelled() {
        log::warn!("interrupted during collection, skipping materialization");
    } else {
        let reverse = index.reverse_map();
        let mut downloader = BatchDownloader::new(&client, &pipeline)?;

        for &source in &sources {
            let ids = index.unique_ids_sorted(source);
            if ids.is_empty() {
                continue;
            }
            log::info!("{source}: materializing {} unique identifiers", fmt_num(ids.len()));
            let stats = downloader.materialize(source, &ids, &reverse, cancel, progress)?;
            report = report.with_download(source, stats);

            if cancel.is_cancelled() {
                break;
            }
        }
    }

    report.log();
    let path = report.write(&pipeline.output_dir)?;
    log::info!("report written to {}", path.display());

    if args.export_csv && !report.interrupted {
        let out = pipeline.output_dir.join("records.csv");
        litharvest_pipeline::export::export_csv(&pipeline.records_dir(), &out)?;
    }

    if report.interrupted {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
