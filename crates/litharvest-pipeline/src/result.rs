//! Per-(subject, source) collection result

use std::time::Duration;

use litharvest_entrez::Source;

/// Outcome of collecting one subject's identifiers from one source.
///
/// Produced once per (subject, source) per run and merged exactly once.
/// `success=true` with an empty identifier list means the subject genuinely
/// has no literature in that catalog; `success=false` means the search
/// infrastructure failed. The two are never conflated.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub subject: String,
    pub source: Source,
    /// Normalized identifiers in retrieval order (deduplicated downstream)
    pub identifiers: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
    /// False when cancellation stopped paging early; a partial result is
    /// merged but its subject stays unprocessed so a resumed run redoes it.
    pub complete: bool,
    pub elapsed: Duration,
}

impl CollectionResult {
    pub fn collected(
        subject: &str,
        source: Source,
        identifiers: Vec<String>,
        complete: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            source,
            identifiers,
            success: true,
            error: None,
            complete,
            elapsed,
        }
    }

    pub fn failed(subject: &str, source: Source, error: String, elapsed: Duration) -> Self {
        Self {
            subject: subject.to_string(),
            source,
            identifiers: Vec::new(),
            success: false,
            error: Some(error),
            complete: true,
            elapsed,
        }
    }
}
