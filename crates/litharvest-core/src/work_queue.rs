//! Lock-free work queue distributing subjects across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free queue of work items claimed by worker threads.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next
/// item. Construction-time filtering supports resume: subjects already in
/// the loaded checkpoint never enter the queue.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    /// Queue over all items, in worklist order.
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Queue keeping only items that pass `keep` (resume/skip support).
    pub fn filtered(items: Vec<S>, keep: impl Fn(&S) -> bool) -> Self {
        let before = items.len();
        let filtered: Vec<S> = items.into_iter().filter(|s| keep(s)).collect();
        log::debug!(
            "work queue: {} of {before} items remaining",
            filtered.len()
        );
        Self {
            items: filtered,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free). None when the queue is drained.
    pub fn next(&self) -> Option<&S> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    /// Total items in the queue.
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
