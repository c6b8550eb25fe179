//! Progress counters and the observer interface.
//!
//! Counters are monitoring only; nothing in the pipeline reads them to make
//! decisions. Observers receive the same events the counters record so
//! callers can render progress without the core writing to a terminal.

use crate::error::FetchError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receives pipeline events. Implementations must be cheap and non-blocking;
/// they are called from worker tasks.
pub trait ProgressObserver: Send + Sync {
    /// The run is about to dispatch `total` identifiers.
    fn on_start(&self, _total: u64) {}

    /// `identifier` completed and `rows` were written for it.
    fn on_completed(&self, _identifier: &str, _rows: usize, _processed: u64, _total: u64) {}

    /// `identifier` received a 429 on its `attempt`-th throttled try.
    fn on_throttled(&self, _identifier: &str, _attempt: u32) {}

    /// `identifier` was dropped without output.
    fn on_abandoned(&self, _identifier: &str, _error: &FetchError) {}

    /// `completed` successful fetches so far; `elapsed` since the previous
    /// milestone (or run start).
    fn on_milestone(&self, _completed: u64, _elapsed: Duration) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Shared run counters.
#[derive(Debug)]
pub struct ProgressCounters {
    total: u64,
    processed: AtomicU64,
    rows: AtomicU64,
    throttled: AtomicU64,
    milestone_every: u64,
    last_milestone: Mutex<Instant>,
}

impl ProgressCounters {
    pub fn new(total: u64, milestone_every: u64) -> Self {
        Self {
            total,
            processed: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            milestone_every: milestone_every.max(1),
            last_milestone: Mutex::new(Instant::now()),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::SeqCst)
    }

    pub fn throttle_events(&self) -> u64 {
        self.throttled.load(Ordering::SeqCst)
    }

    /// Record one successful identifier and return the new processed count.
    pub fn record_completed(&self, rows: usize) -> u64 {
        self.rows.fetch_add(rows as u64, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::SeqCst);
    }

    /// If `processed` lands on a milestone, return the time since the last one.
    pub fn milestone(&self, processed: u64) -> Option<Duration> {
        if processed == 0 || processed % self.milestone_every != 0 {
            return None;
        }

        // A poisoned lock only means another worker panicked mid-update;
        // the stored instant is still usable.
        let mut last = self
            .last_milestone
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let elapsed = last.elapsed();
        *last = Instant::now();
        Some(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_completed_counts_identifiers_not_rows() {
        let counters = ProgressCounters::new(3, 1000);
        assert_eq!(counters.record_completed(4), 1);
        assert_eq!(counters.record_completed(1), 2);
        assert_eq!(counters.processed(), 2);
        assert_eq!(counters.rows(), 5);
        assert!(counters.processed() <= counters.total());
    }

    #[test]
    fn test_milestones() {
        let counters = ProgressCounters::new(10, 2);
        assert!(counters.milestone(1).is_none());
        assert!(counters.milestone(2).is_some());
        assert!(counters.milestone(3).is_none());
        assert!(counters.milestone(4).is_some());
        assert!(counters.milestone(0).is_none());
    }

    #[test]
    fn test_throttle_counter() {
        let counters = ProgressCounters::new(1, 1000);
        counters.record_throttled();
        counters.record_throttled();
        assert_eq!(counters.throttle_events(), 2);
    }
}
