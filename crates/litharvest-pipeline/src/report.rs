//! Run report: dedup effect, success/failure tallies, timings
//!
//! Emitted at normal completion and at interruption; the interruption
//! path is part of the resumability contract, not optional cleanup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use litharvest_core::fmt_num;
use litharvest_entrez::Source;

use crate::coordinator::CollectStats;
use crate::download::DownloadStats;
use crate::index::{Counters, SharedIndex};

/// Per-source dedup effect
#[derive(Debug, Serialize)]
pub struct SourceStats {
    pub raw_count: usize,
    pub unique_count: usize,
    pub dedup_rate_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct SubjectStats {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Summary of one harvest run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub interrupted: bool,
    pub subjects: SubjectStats,
    pub sources: BTreeMap<Source, SourceStats>,
    pub collection_elapsed_secs: f64,
    pub download: BTreeMap<Source, DownloadStats>,
}

impl RunReport {
    pub fn build(index: &SharedIndex, collect: &CollectStats) -> Self {
        let Counters {
            processed,
            succeeded,
            failed,
        } = collect.counters;

        let mut sources = BTreeMap::new();
        for source in Source::ALL {
            let raw = index.raw_count(source);
            let unique = index.unique_count(source);
            if raw == 0 && unique == 0 {
                continue;
            }
            let dedup_rate_pct = if raw > 0 {
                (raw - unique) as f64 / raw as f64 * 100.0
            } else {
                0.0
            };
            sources.insert(
                source,
                SourceStats {
                    raw_count: raw,
                    unique_count: unique,
                    dedup_rate_pct,
                },
            );
        }

        Self {
            generated_at: chrono::Utc::now(),
            interrupted: collect.interrupted,
            subjects: SubjectStats {
                total: collect.subjects_total,
                processed,
                succeeded,
                failed,
            },
            sources,
            collection_elapsed_secs: collect.elapsed.as_secs_f64(),
            download: BTreeMap::new(),
        }
    }

    pub fn with_download(mut self, source: Source, stats: DownloadStats) -> Self {
        if stats.interrupted {
            self.interrupted = true;
        }
        self.download.insert(source, stats);
        self
    }

    /// Write `run_report.json` under the output directory.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("run_report.json");
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn log(&self) {
        log::info!("=== Harvest Summary ===");
        log::info!(
            "subjects: {}/{} processed ({} ok, {} failed){}",
            fmt_num(self.subjects.processed),
            fmt_num(self.subjects.total),
            fmt_num(self.subjects.succeeded),
            fmt_num(self.subjects.failed),
            if self.interrupted { " [interrupted]" } else { "" }
        );
        for (source, stats) in &self.sources {
            log::info!(
                "{source}: {} -> {} ids after dedup ({:.1}% duplicate)",
                fmt_num(stats.raw_count),
                fmt_num(stats.unique_count),
                stats.dedup_rate_pct
            );
        }
        for (source, stats) in &self.download {
            log::info!(
                "{source}: {} records materialized, {} batches failed",
                fmt_num(stats.records_written),
                stats.batches_failed
            );
        }
        log::info!(
            "collection time: {:.1}s",
            self.collection_elapsed_secs
        );
    }
}
