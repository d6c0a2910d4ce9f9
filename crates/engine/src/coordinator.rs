//! Unit-of-work coordinator
//!
//! Tracks unit-of-work lifecycle metrics for one `Chronicle` handle:
//! started, committed, aborted, and objects rolled back.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle metrics of the units of work of one handle
///
/// # Memory Ordering
///
/// The counters use Relaxed ordering: they are observational only and do not
/// synchronize any other memory operation. The atomic read-modify-write
/// operations still guarantee no torn or lost updates.
#[derive(Debug, Default)]
pub struct UnitOfWorkCoordinator {
    /// Units of work begun and not yet completed
    active_count: AtomicU64,
    /// Total units of work begun
    total_started: AtomicU64,
    /// Total units of work committed
    total_committed: AtomicU64,
    /// Total units of work aborted (explicitly, by a failed commit, or dropped)
    total_aborted: AtomicU64,
    /// Total objects whose state was replaced by a historical version
    total_rolled_back: AtomicU64,
}

impl UnitOfWorkCoordinator {
    /// Create a coordinator with zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit of work start
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a commit
    ///
    /// Decrements active count (saturating at 0) and increments committed count.
    pub fn record_commit(&self) {
        self.finish();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abort
    ///
    /// Decrements active count (saturating at 0) and increments aborted count.
    pub fn record_abort(&self) {
        self.finish();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record objects rolled back to a historical version
    pub fn record_rollbacks(&self, count: usize) {
        self.total_rolled_back.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn finish(&self) {
        // Saturating decrement; fetch_update never fails with a closure returning Some
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| Some(x.saturating_sub(1)));
    }

    /// Snapshot of the current metrics
    pub fn metrics(&self) -> UnitOfWorkMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        UnitOfWorkMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_rolled_back: self.total_rolled_back.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// Unit-of-work metrics
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOfWorkMetrics {
    /// Units of work currently open
    pub active_count: u64,
    /// Total units of work begun
    pub total_started: u64,
    /// Total units of work committed
    pub total_committed: u64,
    /// Total units of work aborted
    pub total_aborted: u64,
    /// Total objects rolled back
    pub total_rolled_back: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl UnitOfWorkMetrics {
    /// Units of work that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
