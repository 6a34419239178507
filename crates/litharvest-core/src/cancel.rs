//! Cooperative cancellation token

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token threaded through every task.
///
/// Checked before a worker starts a new subject and between result pages,
/// never mid-network-call. Clones share the same flag; the CLI wires the
/// SIGINT/SIGTERM handler to one token and hands clones to the pipeline.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// The shared flag, for signal-handler registration.
    pub fn as_flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}
