//! Consecutive-timeout accounting across analysis cycles.
//!
//! One streak is shared by every camera. A cycle with any success resets it;
//! otherwise a cycle with at least one timeout adds one; a cycle of only
//! other failures leaves it alone.

use crate::models::InferenceResult;

pub const TIMEOUT_THRESHOLD: u32 = 3;

/// Outcome counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTally {
    pub successes: u32,
    pub timeouts: u32,
    pub failures: u32,
}

impl CycleTally {
    pub fn record(&mut self, result: &InferenceResult) {
        if result.ok {
            self.successes += 1;
        } else if result.is_timeout() {
            self.timeouts += 1;
        } else {
            self.failures += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.successes + self.timeouts + self.failures == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerVerdict {
    /// Nothing worth reporting.
    Steady,
    /// Timeouts seen, below the threshold (or already tripped).
    Slow,
    /// Threshold reached; pause monitoring. Reported once per streak.
    Tripped,
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    streak: u32,
    tripped: bool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn record_cycle(&mut self, tally: CycleTally) -> BreakerVerdict {
        if tally.successes > 0 {
            self.streak = 0;
            self.tripped = false;
        } else if tally.timeouts > 0 {
            self.streak += 1;
        }

        if self.streak >= TIMEOUT_THRESHOLD && !self.tripped {
            self.tripped = true;
            return BreakerVerdict::Tripped;
        }
        if tally.timeouts > 0 {
            BreakerVerdict::Slow
        } else {
            BreakerVerdict::Steady
        }
    }

    pub fn reset(&mut self) {
        self.streak = 0;
        self.tripped = false;
    }
}
