//! Shared deduplication index
//!
//! The only mutable state touched by multiple workers. All mutation goes
//! through [`SharedIndex::merge_subject`], a single critical section, so
//! concurrent merges never interleave; callers never touch the lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use litharvest_entrez::Source;

use crate::checkpoint::Checkpoint;
use crate::result::CollectionResult;

/// Subject-level progress counters
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Counters {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct RunState {
    /// Global union of identifiers, per source
    unique: FxHashMap<Source, FxHashSet<String>>,
    /// identifier -> subjects whose successful result contained it
    subjects_for: FxHashMap<String, BTreeSet<String>>,
    /// Successful per-subject identifier lists (raw, pre-dedup); the
    /// source of truth the checkpoint persists and restore rebuilds from
    by_subject: BTreeMap<String, BTreeMap<Source, Vec<String>>>,
    /// subject -> source -> error string, for reporting
    failed_tasks: BTreeMap<String, BTreeMap<Source, String>>,
    /// Subjects fully collected across all sources
    processed: BTreeSet<String>,
    counters: Counters,
}

impl RunState {
    fn merge_one(&mut self, result: &CollectionResult) {
        if !result.success {
            self.failed_tasks
                .entry(result.subject.clone())
                .or_default()
                .insert(
                    result.source,
                    result.error.clone().unwrap_or_else(|| "unknown".into()),
                );
            return;
        }

        let unique = self.unique.entry(result.source).or_default();
        for id in &result.identifiers {
            unique.insert(id.clone());
            // Membership-checked insert keeps provenance duplicate-free
            // even when a subject is reprocessed after a resume
            self.subjects_for
                .entry(id.clone())
                .or_default()
                .insert(result.subject.clone());
        }

        self.by_subject
            .entry(result.subject.clone())
            .or_default()
            .insert(result.source, result.identifiers.clone());
    }
}

/// Lock-guarded dedup index with atomic merge and read accessors.
#[derive(Default)]
pub struct SharedIndex {
    state: Mutex<RunState>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a loaded checkpoint by re-merging every
    /// persisted per-subject result (set union is idempotent, so the
    /// restored index equals the one that was saved).
    pub fn from_checkpoint(cp: Checkpoint) -> Self {
        let index = Self::new();
        {
            let mut guard = index.lock();
            let state = &mut *guard;
            for (subject, per_source) in &cp.subject_ids {
                for (source, ids) in per_source {
                    let unique = state.unique.entry(*source).or_default();
                    for id in ids {
                        unique.insert(id.clone());
                        state
                            .subjects_for
                            .entry(id.clone())
                            .or_default()
                            .insert(subject.clone());
                    }
                }
            }
            state.by_subject = cp.subject_ids;
            state.failed_tasks = cp.failed_tasks;
            state.processed = cp.processed_subjects.into_iter().collect();
            state.counters = cp.counters;
        }
        index
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().expect("index lock poisoned")
    }

    /// Merge one subject's results from all sources, update counters, and
    /// mark the subject processed when collection ran to completion.
    ///
    /// Returns the new processed count when this call completed the
    /// subject, `None` for a partial (cancelled) merge — the checkpoint
    /// cadence keys off completions only.
    pub fn merge_subject(
        &self,
        subject: &str,
        results: &[CollectionResult],
        complete: bool,
    ) -> Option<usize> {
        let mut state = self.lock();

        for result in results {
            state.merge_one(result);
        }

        if !complete {
            return None;
        }

        if state.processed.insert(subject.to_string()) {
            state.counters.processed += 1;
            if results.iter().all(|r| r.success) {
                state.counters.succeeded += 1;
            } else {
                state.counters.failed += 1;
            }
        }
        Some(state.counters.processed)
    }

    pub fn is_processed(&self, subject: &str) -> bool {
        self.lock().processed.contains(subject)
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters
    }

    /// Deduplicated identifier count for one source.
    pub fn unique_count(&self, source: Source) -> usize {
        self.lock().unique.get(&source).map_or(0, |s| s.len())
    }

    /// Pre-dedup identifier count: sum over per-subject results.
    pub fn raw_count(&self, source: Source) -> usize {
        self.lock()
            .by_subject
            .values()
            .filter_map(|per_source| per_source.get(&source))
            .map(|ids| ids.len())
            .sum()
    }

    /// Subjects whose successful result contained this identifier.
    pub fn subjects_for(&self, identifier: &str) -> BTreeSet<String> {
        self.lock()
            .subjects_for
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Sorted deduplicated identifiers for one source (stable batch order).
    pub fn unique_ids_sorted(&self, source: Source) -> Vec<String> {
        let state = self.lock();
        let mut ids: Vec<String> = state
            .unique
            .get(&source)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Snapshot of the reverse map for the download phase (one lock, not
    /// one lock per record).
    pub fn reverse_map(&self) -> FxHashMap<String, Vec<String>> {
        self.lock()
            .subjects_for
            .iter()
            .map(|(id, subjects)| (id.clone(), subjects.iter().cloned().collect()))
            .collect()
    }

    /// Consistent snapshot for persistence.
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.lock();
        Checkpoint {
            version: crate::checkpoint::CHECKPOINT_VERSION,
            processed_subjects: state.processed.iter().cloned().collect(),
            subject_ids: state.by_subject.clone(),
            failed_tasks: state.failed_tasks.clone(),
            counters: state.counters,
            saved_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok(subject: &str, source: Source, ids: &[&str]) -> CollectionResult {
        CollectionResult::collected(
            subject,
            source,
            ids.iter().map(|s| s.to_string()).collect(),
            true,
            Duration::ZERO,
        )
    }

    fn err(subject: &str, source: Source) -> CollectionResult {
        CollectionResult::failed(subject, source, "HTTP 500".into(), Duration::ZERO)
    }

    #[test]
    fn union_across_overlapping_subjects() {
        let index = SharedIndex::new();
        index.merge_subject("A", &[ok("A", Source::Pmc, &["R100", "R101"])], true);
        index.merge_subject("B", &[ok("B", Source::Pmc, &["R100", "R102"])], true);

        assert_eq!(index.unique_count(Source::Pmc), 3);
        assert_eq!(index.raw_count(Source::Pmc), 4);
    }

    #[test]
    fn shared_identifier_has_both_subjects() {
        let index = SharedIndex::new();
        index.merge_subject("Disease-A", &[ok("Disease-A", Source::Pmc, &["R100"])], true);
        index.merge_subject("Disease-B", &[ok("Disease-B", Source::Pmc, &["R100"])], true);
        index.merge_subject("Disease-C", &[ok("Disease-C", Source::Pmc, &[])], true);

        let subjects = index.subjects_for("R100");
        assert_eq!(
            subjects.into_iter().collect::<Vec<_>>(),
            vec!["Disease-A", "Disease-B"]
        );
        assert_eq!(index.counters().succeeded, 3);
    }

    #[test]
    fn reprocessing_does_not_duplicate_provenance() {
        let index = SharedIndex::new();
        index.merge_subject("X", &[ok("X", Source::Pubmed, &["A1"])], true);
        // At-least-once resume can replay the same subject
        index.merge_subject("X", &[ok("X", Source::Pubmed, &["A1"])], true);

        assert_eq!(index.subjects_for("A1").len(), 1);
        assert_eq!(index.counters().processed, 1);
        assert_eq!(index.raw_count(Source::Pubmed), 1);
    }

    #[test]
    fn failed_result_contributes_no_identifiers() {
        let index = SharedIndex::new();
        index.merge_subject("X", &[err("X", Source::Pmc)], true);

        assert_eq!(index.unique_count(Source::Pmc), 0);
        assert_eq!(index.counters().failed, 1);
        assert!(index.is_processed("X"));
    }

    #[test]
    fn mixed_outcome_counts_as_failed_subject() {
        let index = SharedIndex::new();
        index.merge_subject(
            "X",
            &[ok("X", Source::Pubmed, &["1"]), err("X", Source::Pmc)],
            true,
        );

        let counters = index.counters();
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.succeeded, 0);
        // The successful source's ids still entered the index
        assert_eq!(index.unique_count(Source::Pubmed), 1);
    }

    #[test]
    fn partial_merge_leaves_subject_unprocessed() {
        let index = SharedIndex::new();
        let outcome = index.merge_subject("X", &[ok("X", Source::Pubmed, &["1"])], false);

        assert!(outcome.is_none());
        assert!(!index.is_processed("X"));
        // Partial identifiers are kept; set union absorbs the redo
        assert_eq!(index.unique_count(Source::Pubmed), 1);
    }

    #[test]
    fn completion_returns_running_count() {
        let index = SharedIndex::new();
        assert_eq!(
            index.merge_subject("A", &[ok("A", Source::Pmc, &[])], true),
            Some(1)
        );
        assert_eq!(
            index.merge_subject("B", &[ok("B", Source::Pmc, &[])], true),
            Some(2)
        );
    }

    #[test]
    fn checkpoint_roundtrip_restores_index() {
        let index = SharedIndex::new();
        index.merge_subject("A", &[ok("A", Source::Pmc, &["R1", "R2"])], true);
        index.merge_subject("B", &[ok("B", Source::Pmc, &["R2"])], true);
        index.merge_subject("C", &[err("C", Source::Pubmed)], true);

        let restored = SharedIndex::from_checkpoint(index.checkpoint());

        assert_eq!(restored.unique_count(Source::Pmc), 2);
        assert_eq!(restored.subjects_for("R2").len(), 2);
        assert!(restored.is_processed("A"));
        assert!(restored.is_processed("C"));
        assert_eq!(restored.counters().processed, 3);
        assert_eq!(restored.counters().failed, 1);
    }

    #[test]
    fn sorted_ids_are_stable() {
        let index = SharedIndex::new();
        index.merge_subject("A", &[ok("A", Source::Pmc, &["PMC9", "PMC1", "PMC5"])], true);
        assert_eq!(
            index.unique_ids_sorted(Source::Pmc),
            vec!["PMC1", "PMC5", "PMC9"]
        );
    }
}
