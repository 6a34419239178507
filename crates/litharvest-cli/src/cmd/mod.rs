//! Subcommand implementations

pub mod collect;
pub mod export;
pub mod fetch;
pub mod run;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

/// Load the subject worklist: one name per line, blanks skipped,
/// order preserved.
pub fn load_subjects(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read subject list {}", path.display()))?;

    let mut subjects: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if let Some(limit) = limit {
        subjects.truncate(limit);
    }

    anyhow::ensure!(
        !subjects.is_empty(),
        "subject list {} is empty",
        path.display()
    );
    log::info!("loaded {} subjects from {}", subjects.len(), path.display());
    Ok(subjects)
}
