//! Litharvest pipeline: concurrent identifier collection, deduplication,
//! checkpointed resume, and sequential batch materialization.
//!
//! Stage one fans subjects out over a bounded worker pool; every completed
//! result funnels through one serialized merge into the shared dedup index.
//! Stage two walks the deduplicated identifier set in fixed-size batches on
//! a single thread, attaching subject provenance from the reverse map.

pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod export;
pub mod index;
pub mod report;
pub mod result;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use collector::IdentifierCollector;
pub use config::PipelineConfig;
pub use coordinator::{CollectStats, run_collection};
pub use download::{BatchDownloader, DownloadStats};
pub use index::{Counters, SharedIndex};
pub use report::RunReport;
pub use result::CollectionResult;
