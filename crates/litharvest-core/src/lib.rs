//! Litharvest Core - Common infrastructure for literature harvesting
//!
//! This crate provides the pieces shared by the collection and download
//! phases: the HTTP facade, retry and rate-limit discipline, cooperative
//! cancellation, and the work queue that feeds the worker pool.

pub mod cancel;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod rate;
pub mod retry;
pub mod work_queue;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use error::FetchError;
pub use http::{SHARED_RUNTIME, fetch_text, http_client};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use rate::RateBudget;
pub use retry::RetryPolicy;
pub use work_queue::WorkQueue;
