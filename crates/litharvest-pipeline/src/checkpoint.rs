//! Checkpoint persistence for resumable runs
//!
//! The checkpoint is a versioned, tagged JSON structure; anything that
//! fails to load (missing file, torn write, malformed JSON, unknown
//! version) is treated as "no checkpoint", never as a fatal error. Saves
//! go through a temp file + rename so a crash mid-write can never leave a
//! half-valid file behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use litharvest_entrez::Source;

use crate::index::Counters;

pub const CHECKPOINT_VERSION: u32 = 1;

/// Persisted snapshot of run progress.
///
/// `subject_ids` (successful per-subject identifier lists) is the source
/// of truth; the dedup index and reverse map are rebuilt from it on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub processed_subjects: Vec<String>,
    pub subject_ids: BTreeMap<String, BTreeMap<Source, Vec<String>>>,
    pub failed_tasks: BTreeMap<String, BTreeMap<Source, String>>,
    pub counters: Counters,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// Owns the checkpoint file and its human-readable sibling.
pub struct CheckpointStore {
    path: PathBuf,
    summary_path: PathBuf,
    // Saves can race when two workers cross a cadence boundary together
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("checkpoint.json"),
            summary_path: dir.join("subject_index.json"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, or `None` if absent/unreadable/wrong version.
    pub fn load(&self) -> Option<Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("checkpoint unreadable, starting fresh: {e}");
                return None;
            }
        };

        let cp: Checkpoint = match serde_json::from_str(&content) {
            Ok(cp) => cp,
            Err(e) => {
                log::warn!("checkpoint malformed, starting fresh: {e}");
                return None;
            }
        };

        if cp.version != CHECKPOINT_VERSION {
            log::warn!(
                "checkpoint version {} != {}, starting fresh",
                cp.version,
                CHECKPOINT_VERSION
            );
            return None;
        }

        log::info!(
            "resuming from checkpoint: {} subjects processed (saved {})",
            cp.processed_subjects.len(),
            cp.saved_at
        );
        Some(cp)
    }

    /// Atomically persist the checkpoint and refresh the readable summary.
    pub fn save(&self, cp: &Checkpoint) -> Result<()> {
        let _guard = self.write_lock.lock().expect("checkpoint lock poisoned");

        let json = serde_json::to_string(cp).context("failed to serialize checkpoint")?;
        write_atomic(&self.path, json.as_bytes())?;

        let summary = subject_summary(cp);
        let json = serde_json::to_string_pretty(&summary)
            .context("failed to serialize subject index")?;
        write_atomic(&self.summary_path, json.as_bytes())?;

        log::debug!(
            "checkpoint saved: {} subjects processed",
            cp.processed_subjects.len()
        );
        Ok(())
    }
}

/// Write via temp file + rename so readers never observe a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Per-subject entry in the human-readable summary
#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub counts: BTreeMap<Source, usize>,
    pub identifiers: BTreeMap<Source, Vec<String>>,
}

/// Inspectable subject -> identifiers mapping, derived from the checkpoint.
pub fn subject_summary(cp: &Checkpoint) -> BTreeMap<String, SubjectSummary> {
    cp.subject_ids
        .iter()
        .map(|(subject, per_source)| {
            let counts = per_source
                .iter()
                .map(|(source, ids)| (*source, ids.len()))
                .collect();
            (
                subject.clone(),
                SubjectSummary {
                    counts,
                    identifiers: per_source.clone(),
                },
            )
        })
        .collect()
}
