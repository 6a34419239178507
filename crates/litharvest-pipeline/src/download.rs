//! Sequential batch materialization of the deduplicated corpus
//!
//! The fetch phase shares one external throughput budget for the whole
//! run, so batches go out strictly one at a time. Identifiers already
//! materialized by a prior completed run are skipped via the persisted
//! manifest; a failed batch is logged and skipped, leaving its
//! identifiers eligible for a future run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use litharvest_core::{CancelToken, RateBudget, RetryPolicy, SharedProgress, fmt_num};
use litharvest_entrez::{Catalog, Source, parse_records};

use crate::config::PipelineConfig;

pub const MANIFEST_VERSION: u32 = 1;

/// Download phase summary
#[derive(Debug, Default, Clone, Serialize)]
pub struct DownloadStats {
    pub identifiers_requested: usize,
    pub identifiers_skipped: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub batches_failed: usize,
    pub records_written: usize,
    pub failed_identifiers: usize,
    pub interrupted: bool,
    pub elapsed_secs: f64,
}

impl DownloadStats {
    pub fn log(&self, source: Source) {
        log::info!(
            "{source}: {} records from {}/{} batches ({} failed) in {:.1}s, {} ids skipped",
            fmt_num(self.records_written),
            self.batches_completed,
            self.batches_total,
            self.batches_failed,
            self.elapsed_secs,
            fmt_num(self.identifiers_skipped)
        );
    }
}

/// Identifiers fetched by prior completed batches, per source.
///
/// Restarting never re-fetches or re-parses a record already covered here.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MaterializedManifest {
    pub version: u32,
    pub ids: BTreeMap<Source, BTreeSet<String>>,
}

impl MaterializedManifest {
    fn load(path: &PathBuf) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::fresh(),
            Err(e) => {
                log::warn!("materialized manifest unreadable, re-fetching all: {e}");
                return Self::fresh();
            }
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(m) if m.version == MANIFEST_VERSION => m,
            Ok(m) => {
                log::warn!("materialized manifest version {} unsupported", m.version);
                Self::fresh()
            }
            Err(e) => {
                log::warn!("materialized manifest malformed, re-fetching all: {e}");
                Self::fresh()
            }
        }
    }

    fn fresh() -> Self {
        Self {
            version: MANIFEST_VERSION,
            ids: BTreeMap::new(),
        }
    }

    fn save(&self, path: &PathBuf) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(self).context("failed to serialize manifest")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    fn contains(&self, source: Source, id: &str) -> bool {
        self.ids.get(&source).is_some_and(|set| set.contains(id))
    }

    fn mark_batch(&mut self, source: Source, ids: &[String]) {
        self.ids
            .entry(source)
            .or_default()
            .extend(ids.iter().cloned());
    }
}

/// One persisted batch document
#[derive(Serialize)]
struct BatchDocument<'a> {
    source: Source,
    batch_index: usize,
    fetched_at: chrono::DateTime<chrono::Utc>,
    identifiers: &'a [String],
    record_count: usize,
    records: Vec<RecordEntry>,
}

#[derive(Serialize)]
struct RecordEntry {
    identifier: String,
    provenance: Vec<String>,
    fields: serde_json::Value,
}

/// Consumes the deduplicated identifier set in bounded sequential batches.
pub struct BatchDownloader<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    config: &'a PipelineConfig,
    rate: RateBudget,
    retry: RetryPolicy,
    manifest: MaterializedManifest,
    manifest_path: PathBuf,
    /// Distinguishes this run's batch files from earlier runs'
    run_tag: String,
}

impl<'a, C: Catalog + ?Sized> BatchDownloader<'a, C> {
    pub fn new(catalog: &'a C, config: &'a PipelineConfig) -> Result<Self> {
        std::fs::create_dir_all(config.records_dir())
            .context("failed to create records directory")?;
        if config.save_raw_xml {
            std::fs::create_dir_all(config.raw_dir())
                .context("failed to create raw directory")?;
        }

        let manifest_path = config.output_dir.join("materialized.json");
        let manifest = MaterializedManifest::load(&manifest_path);

        Ok(Self {
            catalog,
            config,
            rate: RateBudget::with_delay(config.rate_delay),
            retry: config.retry,
            manifest,
            manifest_path,
            run_tag: chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    /// Fetch and persist full records for a source's deduplicated set.
    ///
    /// `ids` must be in stable (sorted) order so batch composition is
    /// deterministic for a given corpus. Provenance comes from the reverse
    /// map snapshot.
    pub fn materialize(
        &mut self,
        source: Source,
        ids: &[String],
        provenance: &FxHashMap<String, Vec<String>>,
        cancel: &CancelToken,
        progress: &SharedProgress,
    ) -> Result<DownloadStats> {
        let start = Instant::now();

        let batch_size = self.config.batch_size.max(1);
        let pending: Vec<String> = ids
            .iter()
            .filter(|id| !self.manifest.contains(source, id))
            .cloned()
            .collect();

        let mut stats = DownloadStats {
            identifiers_requested: ids.len(),
            identifiers_skipped: ids.len() - pending.len(),
            batches_total: pending.len().div_ceil(batch_size),
            ..DownloadStats::default()
        };

        if pending.is_empty() {
            log::info!("{source}: all {} identifiers already materialized", ids.len());
            stats.elapsed_secs = start.elapsed().as_secs_f64();
            return Ok(stats);
        }

        log::info!(
            "{source}: fetching {} identifiers in {} batches of {}",
            fmt_num(pending.len()),
            stats.batches_total,
            batch_size
        );

        let pb = progress.stage_line("fetch");

        for (i, chunk) in pending.chunks(batch_size).enumerate() {
            let batch_index = i + 1;
            if cancel.is_cancelled() {
                log::warn!(
                    "{source}: cancelled before batch {batch_index}/{}",
                    stats.batches_total
                );
                stats.interrupted = true;
                break;
            }

            pb.set_message(format!(
                "{source} batch {batch_index}/{} ({} ids)",
                stats.batches_total,
                chunk.len()
            ));

            match self.fetch_one_batch(source, batch_index, chunk, provenance) {
                Ok(written) => {
                    stats.batches_completed += 1;
                    stats.records_written += written;
                }
                Err(e) => {
                    // Skip and carry on; these ids stay unmaterialized
                    log::error!("{source}: batch {batch_index} failed: {e:#}");
                    stats.batches_failed += 1;
                    stats.failed_identifiers += chunk.len();
                }
            }
        }

        pb.finish_and_clear();
        stats.elapsed_secs = start.elapsed().as_secs_f64();
        stats.log(source);
        Ok(stats)
    }

    /// Fetch, parse, persist, and mark one batch. Any error fails the
    /// whole batch; the retry inside re-issues the whole fetch, never a
    /// partial resume.
    fn fetch_one_batch(
        &mut self,
        source: Source,
        batch_index: usize,
        chunk: &[String],
        provenance: &FxHashMap<String, Vec<String>>,
    ) -> Result<usize> {
        let label = format!("{source} batch {batch_index}");

        self.rate.pace();
        let xml = self
            .retry
            .call(&label, || self.catalog.fetch_batch(source, chunk))
            .with_context(|| format!("fetch failed for {} ids", chunk.len()))?;

        let parsed = parse_records(source, &xml).context("payload parse failed")?;

        let stem = format!("{source}_batch_{batch_index:05}_{}", self.run_tag);

        if self.config.save_raw_xml {
            let raw_path = self.config.raw_dir().join(format!("{stem}.xml"));
            std::fs::write(&raw_path, &xml)
                .with_context(|| format!("failed to write {}", raw_path.display()))?;
        }

        let records: Vec<RecordEntry> = parsed
            .into_iter()
            .map(|r| RecordEntry {
                provenance: provenance.get(&r.identifier).cloned().unwrap_or_default(),
                identifier: r.identifier,
                fields: r.fields,
            })
            .collect();
        let written = records.len();

        let doc = BatchDocument {
            source,
            batch_index,
            fetched_at: chrono::Utc::now(),
            identifiers: chunk,
            record_count: written,
            records,
        };
        let json_path = self.config.records_dir().join(format!("{stem}.json"));
        let json = serde_json::to_string_pretty(&doc).context("failed to serialize batch")?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("failed to write {}", json_path.display()))?;

        // Mark only after the batch document is durably on disk
        self.manifest.mark_batch(source, chunk);
        if let Err(e) = self.manifest.save(&self.manifest_path) {
            log::warn!("materialized manifest save failed: {e:#}");
        }

        log::debug!("{label}: {written} records -> {stem}.json");
        Ok(written)
    }
}
