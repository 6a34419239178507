//! `litharvest export`: flat CSV derived from batch documents

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::config::Config;

#[derive(Args)]
pub struct ExportArgs {
    /// Output CSV path (default: <output dir>/records.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExportArgs, config: &Config) -> Result<ExitCode> {
    let pipeline = config.pipeline(vec![], None);
    let out = args
        .output
        .unwrap_or_else(|| pipeline.output_dir.join("records.csv"));

    let rows = litharvest_pipeline::export::export_csv(&pipeline.records_dir(), &out)?;
    eprintln!("exported {rows} rows to {}", out.display());
    Ok(ExitCode::SUCCESS)
}
