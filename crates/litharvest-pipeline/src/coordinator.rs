//! Worker-pool coordination for the collection phase
//!
//! A bounded rayon pool pulls subjects off a lock-free queue. Collection
//! runs in parallel; every completed subject funnels through the shared
//! index's single critical section, and every K completions flushes a
//! checkpoint so a crash re-does at most K subjects.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use litharvest_core::{CancelToken, RateBudget, SharedProgress, WorkQueue, fmt_num};
use litharvest_entrez::Catalog;

use crate::checkpoint::CheckpointStore;
use crate::collector::IdentifierCollector;
use crate::config::PipelineConfig;
use crate::index::{Counters, SharedIndex};
use crate::result::CollectionResult;

/// Collection phase summary
#[derive(Debug)]
pub struct CollectStats {
    pub subjects_total: usize,
    pub subjects_skipped: usize,
    pub counters: Counters,
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// One worker's pool-lifetime collectors, one per source.
///
/// Built once per worker at startup; configuration is shared read-only,
/// pacing state is worker-private.
struct WorkerContext<'a> {
    collectors: Vec<IdentifierCollector<'a, dyn Catalog + 'a>>,
}

impl<'a> WorkerContext<'a> {
    fn new(catalog: &'a dyn Catalog, config: &PipelineConfig) -> Self {
        let collectors = config
            .sources
            .iter()
            .map(|&source| {
                IdentifierCollector::new(
                    catalog,
                    source,
                    config.page_size,
                    RateBudget::with_delay(config.rate_delay),
                    config.retry,
                )
            })
            .collect();
        Self { collectors }
    }

    /// Collect one subject from every source, stopping between sources if
    /// cancellation arrives. Returns the results plus whether the subject
    /// ran to completion.
    fn collect_subject(
        &self,
        subject: &str,
        cancel: &CancelToken,
        pb: &indicatif::ProgressBar,
    ) -> (Vec<CollectionResult>, bool) {
        let mut results = Vec::with_capacity(self.collectors.len());

        for collector in &self.collectors {
            if cancel.is_cancelled() && !results.is_empty() {
                return (results, false);
            }
            let result = collector.collect(subject, cancel, pb);
            let complete = result.complete;
            results.push(result);
            if !complete {
                return (results, false);
            }
        }

        (results, true)
    }
}

/// Run the collection phase over the worklist.
///
/// Subjects already in the index's processed set (from a loaded
/// checkpoint) are skipped before the queue is built. A final checkpoint
/// is always flushed before returning, cancelled or not.
pub fn run_collection(
    subjects: &[String],
    catalog: &dyn Catalog,
    config: &PipelineConfig,
    index: &SharedIndex,
    store: &CheckpointStore,
    cancel: &CancelToken,
    progress: &SharedProgress,
) -> Result<CollectStats> {
    let start = Instant::now();
    let total = subjects.len();

    let queue = WorkQueue::filtered(subjects.to_vec(), |s| !index.is_processed(s));
    let skipped = total - queue.total();
    if skipped > 0 {
        log::info!("{skipped} subjects already collected, {} remaining", queue.total());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .context("failed to create thread pool")?;

    pool.scope(|s| {
        for _ in 0..config.workers {
            s.spawn(|_| {
                let ctx = WorkerContext::new(catalog, config);

                while let Some(subject) = queue.next() {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let pb = progress.subject_bar(subject);
                    let (results, complete) = ctx.collect_subject(subject, cancel, &pb);
                    pb.finish_and_clear();

                    for result in &results {
                        if result.success {
                            log::debug!(
                                "{}/{subject}: {} ids in {:.1}s",
                                result.source,
                                fmt_num(result.identifiers.len()),
                                result.elapsed.as_secs_f64()
                            );
                        } else {
                            log::warn!(
                                "{}/{subject}: collection failed: {}",
                                result.source,
                                result.error.as_deref().unwrap_or("unknown")
                            );
                        }
                    }

                    // Serialized merge; checkpoint cadence keys off completions
                    if let Some(completed) = index.merge_subject(subject, &results, complete) {
                        if completed % config.checkpoint_interval == 0 {
                            if let Err(e) = store.save(&index.checkpoint()) {
                                log::warn!("checkpoint save failed: {e:#}");
                            }
                        }
                        let counters = index.counters();
                        log::info!(
                            "progress: {}/{} subjects ({} ok, {} failed)",
                            fmt_num(counters.processed + skipped),
                            fmt_num(total),
                            fmt_num(counters.succeeded),
                            fmt_num(counters.failed)
                        );
                    }
                }
            });
        }
    });

    let interrupted = cancel.is_cancelled();

    // Final flush is the resumability contract, interrupted or not
    if let Err(e) = store.save(&index.checkpoint()) {
        log::error!("final checkpoint save failed: {e:#}");
    }

    let stats = CollectStats {
        subjects_total: total,
        subjects_skipped: skipped,
        counters: index.counters(),
        interrupted,
        elapsed: start.elapsed(),
    };

    if interrupted {
        log::warn!(
            "collection interrupted after {} subjects",
            stats.counters.processed
        );
    } else {
        log::info!(
            "collection complete: {} subjects in {:.1}s",
            fmt_num(stats.counters.processed),
            stats.elapsed.as_secs_f64()
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use litharvest_core::{FetchError, ProgressContext};
    use litharvest_entrez::{SearchPage, Source};

    /// Deterministic in-memory catalog: subject name -> identifier list
    struct MapCatalog {
        entries: Vec<(&'static str, Vec<&'static str>)>,
        calls: AtomicUsize,
        fail_subjects: Vec<&'static str>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl MapCatalog {
        fn new(entries: Vec<(&'static str, Vec<&'static str>)>) -> Self {
            Self {
                entries,
                calls: AtomicUsize::new(0),
                fail_subjects: vec![],
                cancel_after: None,
            }
        }

        fn ids_for(&self, term: &str) -> Option<&Vec<&'static str>> {
            let name = term.trim_matches('"');
            self.entries
                .iter()
                .find(|(subject, _)| {
                    litharvest_entrez::query::clean_name(subject) == name
                })
                .map(|(_, ids)| ids)
        }
    }

    impl Catalog for MapCatalog {
        fn search_count(&self, _source: Source, term: &str) -> Result<usize, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if n >= *after {
                    token.cancel();
                }
            }
            let name = term.trim_matches('"');
            if self.fail_subjects.iter().any(|s| *s == name) {
                return Err(FetchError::Http {
                    status: Some(500),
                    message: "scripted".into(),
                });
            }
            Ok(self.ids_for(term).map_or(0, |ids| ids.len()))
        }

        fn search_page(
            &self,
            _source: Source,
            term: &str,
            retstart: usize,
            retmax: usize,
        ) -> Result<SearchPage, FetchError> {
            let ids = self.ids_for(term).cloned().unwrap_or_default();
            Ok(SearchPage {
                count: ids.len(),
                ids: ids
                    .into_iter()
                    .skip(retstart)
                    .take(retmax)
                    .map(String::from)
                    .collect(),
            })
        }

        fn fetch_batch(&self, _source: Source, _ids: &[String]) -> Result<String, FetchError> {
            Ok(String::new())
        }
    }

    fn test_config(dir: &std::path::Path, workers: usize) -> PipelineConfig {
        PipelineConfig {
            sources: vec![Source::Pmc],
            workers,
            page_size: 100,
            checkpoint_interval: 2,
            rate_delay: Duration::ZERO,
            retry: litharvest_core::RetryPolicy {
                max_retries: 0,
                base_delay: Duration::ZERO,
            },
            output_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    fn subjects(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn overlapping_subjects_deduplicate() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MapCatalog::new(vec![
            ("Disease-A", vec!["R100", "R200"]),
            ("Disease-B", vec!["R100"]),
            ("Disease-C", vec![]),
        ]);
        let config = test_config(dir.path(), 3);
        let index = SharedIndex::new();
        let store = CheckpointStore::new(dir.path());
        let progress = SharedProgress::new(ProgressContext::new());

        let stats = run_collection(
            &subjects(&["Disease-A", "Disease-B", "Disease-C"]),
            &catalog,
            &config,
            &index,
            &store,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        assert!(!stats.interrupted);
        assert_eq!(stats.counters.processed, 3);
        assert_eq!(stats.counters.succeeded, 3);
        assert_eq!(index.unique_count(Source::Pmc), 2);
        assert_eq!(
            index.subjects_for("R100").into_iter().collect::<Vec<_>>(),
            vec!["Disease-A", "Disease-B"]
        );
    }

    #[test]
    fn failed_subject_does_not_poison_others() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MapCatalog {
            fail_subjects: vec!["Bad subject"],
            ..MapCatalog::new(vec![("Good subject", vec!["R1"])])
        };
        let config = test_config(dir.path(), 2);
        let index = SharedIndex::new();
        let store = CheckpointStore::new(dir.path());
        let progress = SharedProgress::new(ProgressContext::new());

        let stats = run_collection(
            &subjects(&["Bad subject", "Good subject"]),
            &catalog,
            &config,
            &index,
            &store,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        assert_eq!(stats.counters.processed, 2);
        assert_eq!(stats.counters.succeeded, 1);
        assert_eq!(stats.counters.failed, 1);
        assert_eq!(index.unique_count(Source::Pmc), 1);
    }

    #[test]
    fn resume_skips_processed_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MapCatalog::new(vec![
            ("Disease-A", vec!["R1"]),
            ("Disease-B", vec!["R2"]),
        ]);
        let config = test_config(dir.path(), 1);
        let store = CheckpointStore::new(dir.path());
        let progress = SharedProgress::new(ProgressContext::new());

        // First run: only Disease-A in the worklist
        let index = SharedIndex::new();
        run_collection(
            &subjects(&["Disease-A"]),
            &catalog,
            &config,
            &index,
            &store,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        // Second run resumes from the checkpoint with the full worklist
        let index = SharedIndex::from_checkpoint(store.load().unwrap());
        let stats = run_collection(
            &subjects(&["Disease-A", "Disease-B"]),
            &catalog,
            &config,
            &index,
            &store,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        assert_eq!(stats.subjects_skipped, 1);
        assert_eq!(index.unique_count(Source::Pmc), 2);
        assert_eq!(index.counters().processed, 2);
    }

    #[test]
    fn resumed_run_matches_uninterrupted_run() {
        let entries = vec![
            ("Disease-A", vec!["R1", "R2"]),
            ("Disease-B", vec!["R2", "R3"]),
            ("Disease-C", vec!["R3", "R4"]),
            ("Disease-D", vec![]),
        ];
        let all = subjects(&["Disease-A", "Disease-B", "Disease-C", "Disease-D"]);
        let progress = SharedProgress::new(ProgressContext::new());

        // Uninterrupted reference run
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 2);
        let reference = SharedIndex::new();
        run_collection(
            &all,
            &MapCatalog::new(entries.clone()),
            &config,
            &reference,
            &CheckpointStore::new(dir.path()),
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        // Split run: prefix first, then resume with the full list
        let dir2 = tempfile::tempdir().unwrap();
        let config2 = test_config(dir2.path(), 2);
        let store2 = CheckpointStore::new(dir2.path());
        let first = SharedIndex::new();
        run_collection(
            &subjects(&["Disease-B", "Disease-A"]),
            &MapCatalog::new(entries.clone()),
            &config2,
            &first,
            &store2,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();
        let resumed = SharedIndex::from_checkpoint(store2.load().unwrap());
        run_collection(
            &all,
            &MapCatalog::new(entries),
            &config2,
            &resumed,
            &store2,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        assert_eq!(
            resumed.unique_ids_sorted(Source::Pmc),
            reference.unique_ids_sorted(Source::Pmc)
        );
        assert_eq!(resumed.subjects_for("R2"), reference.subjects_for("R2"));
        assert_eq!(resumed.counters().processed, 4);
    }

    #[test]
    fn cancellation_stops_new_subjects_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        // Token trips on the first search call: the in-flight subject
        // finishes, no further subjects start
        let catalog = MapCatalog {
            cancel_after: Some((1, token.clone())),
            ..MapCatalog::new(vec![
                ("Disease-A", vec!["R1"]),
                ("Disease-B", vec!["R2"]),
                ("Disease-C", vec!["R3"]),
            ])
        };
        let config = test_config(dir.path(), 1);
        let index = SharedIndex::new();
        let store = CheckpointStore::new(dir.path());
        let progress = SharedProgress::new(ProgressContext::new());

        let stats = run_collection(
            &subjects(&["Disease-A", "Disease-B", "Disease-C"]),
            &catalog,
            &config,
            &index,
            &store,
            &token,
            &progress,
        )
        .unwrap();

        assert!(stats.interrupted);
        assert!(stats.counters.processed < 3);
        // Checkpoint was flushed on the way out
        assert!(store.load().is_some());
    }

    // Serialized merges: hammer the index from many workers and verify the
    // invariant |union of per-subject sets| == unique_count
    #[test]
    fn concurrent_merges_preserve_union_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..40).map(|i| format!("Subject-{i:02}")).collect();
        let leaked: Vec<&'static str> = names
            .iter()
            .map(|s| Box::leak(s.clone().into_boxed_str()) as &'static str)
            .collect();
        let id_pool: Vec<&'static str> = (0..20)
            .map(|i| Box::leak(format!("PMC{i}").into_boxed_str()) as &'static str)
            .collect();

        let entries: Vec<(&'static str, Vec<&'static str>)> = leaked
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let ids: Vec<&'static str> =
                    (0..5).map(|k| id_pool[(i * 3 + k) % id_pool.len()]).collect();
                (*s, ids)
            })
            .collect();

        let mut expected: std::collections::BTreeSet<&str> = Default::default();
        for (_, ids) in &entries {
            expected.extend(ids.iter().copied());
        }

        let catalog = MapCatalog::new(entries);
        let config = test_config(dir.path(), 8);
        let index = SharedIndex::new();
        let store = CheckpointStore::new(dir.path());
        let progress = SharedProgress::new(ProgressContext::new());

        run_collection(
            &names,
            &catalog,
            &config,
            &index,
            &store,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();

        assert_eq!(index.unique_count(Source::Pmc), expected.len());
        assert_eq!(index.counters().processed, 40);
    }
}
