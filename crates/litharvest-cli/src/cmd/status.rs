//! `litharvest status`: inspect checkpoint and materialization progress

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use litharvest_core::fmt_num;
use litharvest_entrez::Source;
use litharvest_pipeline::Checkpoint;
use litharvest_pipeline::download::MaterializedManifest;

use crate::config::Config;

#[derive(Args)]
pub struct StatusArgs {}

pub fn run(_args: StatusArgs, config: &Config) -> Result<ExitCode> {
    let dir = &config.output.dir;

    let mut table = new_table(&["Stage", "Detail", "Value"]);

    match read_json::<Checkpoint>(&dir.join("checkpoint.json")) {
        Some(cp) => {
            table.add_row(vec![
                "collect".to_string(),
                "subjects processed".to_string(),
                fmt_num(cp.counters.processed),
            ]);
            table.add_row(vec![
                "collect".to_string(),
                "succeeded / failed".to_string(),
                format!("{} / {}", cp.counters.succeeded, cp.counters.failed),
            ]);
            for source in Source::ALL {
                let unique: std::collections::BTreeSet<&String> = cp
                    .subject_ids
                    .values()
                    .filter_map(|per_source| per_source.get(&source))
                    .flatten()
                    .collect();
                if !unique.is_empty() {
                    table.add_row(vec![
                        "collect".to_string(),
                        format!("{source} unique ids"),
                        fmt_num(unique.len()),
                    ]);
                }
            }
            table.add_row(vec![
                "collect".to_string(),
                "checkpoint saved".to_string(),
                cp.saved_at.to_rfc3339(),
            ]);
        }
        None => {
            table.add_row(vec!["collect", "checkpoint", "none"]);
        }
    }

    match read_json::<MaterializedManifest>(&dir.join("materialized.json")) {
        Some(manifest) => {
            for (source, ids) in &manifest.ids {
                table.add_row(vec![
                    "fetch".to_string(),
                    format!("{source} materialized"),
                    fmt_num(ids.len()),
                ]);
            }
        }
        None => {
            table.add_row(vec!["fetch", "materialized", "none"]);
        }
    }

    eprintln!("\n{table}");
    Ok(ExitCode::SUCCESS)
}

/// Render the effective configuration for the `config` subcommand.
pub fn print_config(config: &Config) {
    let mut table = new_table(&["Setting", "Value"]);

    table.add_row(vec![
        "Output directory",
        &config.output.dir.display().to_string(),
    ]);
    table.add_row(vec!["Entrez base URL", &config.entrez.base_url]);
    table.add_row(vec![
        "API key",
        if config.entrez.api_key.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Rate budget",
        &format!("{}ms between calls", crate::config::rate_delay_label(config).as_millis()),
    ]);
    table.add_row(vec!["Sources", &config.collect.sources.join(", ")]);
    table.add_row(vec!["Workers", &config.collect.workers.to_string()]);
    table.add_row(vec!["Page size", &config.collect.page_size.to_string()]);
    table.add_row(vec![
        "Checkpoint interval",
        &config.collect.checkpoint_interval.to_string(),
    ]);
    table.add_row(vec!["Batch size", &config.fetch.batch_size.to_string()]);
    table.add_row(vec![
        "Save raw XML",
        if config.fetch.save_raw_xml { "yes" } else { "no" },
    ]);

    eprintln!("\n{table}");
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
