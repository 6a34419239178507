//! Pipeline runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use litharvest_core::RetryPolicy;
use litharvest_entrez::Source;

/// Runtime configuration shared read-only by all workers
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Catalogs to harvest
    pub sources: Vec<Source>,
    /// Worker threads for the collection phase
    pub workers: usize,
    /// Identifiers per esearch page (retmax)
    pub page_size: usize,
    /// Completed subjects between checkpoint flushes
    pub checkpoint_interval: usize,
    /// Identifiers per efetch batch in the download phase
    pub batch_size: usize,
    /// Root for checkpoint, records, and reports
    pub output_dir: PathBuf,
    /// Minimum delay between calls to one source (per worker)
    pub rate_delay: Duration,
    /// Retry discipline for every external call
    pub retry: RetryPolicy,
    /// Keep the raw XML payload next to the parsed batch documents
    pub save_raw_xml: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Source::ALL.to_vec(),
            workers: 4,
            page_size: 10_000,
            checkpoint_interval: 10,
            batch_size: 200,
            output_dir: PathBuf::from("harvest"),
            rate_delay: litharvest_core::rate::DELAY_WITHOUT_KEY,
            retry: RetryPolicy::default(),
            save_raw_xml: true,
        }
    }
}

impl PipelineConfig {
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir.clone()
    }

    pub fn records_dir(&self) -> PathBuf {
        self.output_dir.join("records")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.output_dir.join("raw")
    }
}
