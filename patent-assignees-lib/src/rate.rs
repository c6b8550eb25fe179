//! Shared rate budget consulted by every worker before a request.
//!
//! The budget is a single atomic integer. A positive value licenses an
//! immediate attempt; zero parks the caller in a fixed-interval poll loop.
//! A 429 drops it to zero. A successful response refills it, and so does a
//! throttled worker that gives up on its identifier.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Process-wide permit counter, shared by `Arc` between workers.
#[derive(Debug)]
pub struct RateController {
    budget: AtomicI64,
    replenish: i64,
    poll_interval: Duration,
}

impl RateController {
    /// Create a controller starting at `initial` permits.
    ///
    /// Negative inputs are clamped to zero so the budget is never observed
    /// below zero.
    pub fn new(initial: i64, replenish: i64, poll_interval: Duration) -> Self {
        Self {
            budget: AtomicI64::new(initial.max(0)),
            replenish: replenish.max(1),
            poll_interval,
        }
    }

    /// Non-blocking check that the budget is currently positive.
    pub fn has_budget(&self) -> bool {
        self.budget.load(Ordering::SeqCst) > 0
    }

    /// Current budget value.
    pub fn current(&self) -> i64 {
        self.budget.load(Ordering::SeqCst)
    }

    /// The value `restore` sets.
    pub fn replenish_value(&self) -> i64 {
        self.replenish
    }

    /// Suspend until the budget is positive.
    ///
    /// Polls at a fixed interval; waiting workers are not ordered, any of
    /// them may proceed once the budget comes back.
    pub async fn block_until_available(&self) {
        while !self.has_budget() {
            sleep(self.poll_interval).await;
        }
    }

    /// Drop the budget to zero after a throttle response.
    pub fn deplete(&self) {
        self.budget.store(0, Ordering::SeqCst);
    }

    /// Refill the budget after a successful response. Idempotent.
    pub fn restore(&self) {
        self.budget.store(self.replenish, Ordering::SeqCst);
    }
}
