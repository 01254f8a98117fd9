//! Fixed-delay retry budget for stalled socket I/O.
//!
//! A stalled read or write waits at most `delay` per attempt. After
//! `max_attempts` consecutive stalls the operation is abandoned; any progress
//! resets the count. Operations that run on the broker loop are additionally
//! capped at [`RetryPolicy::total`] overall.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Upper bound on one whole operation, `max_attempts * delay`.
    pub fn total(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }

    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            policy: *self,
            stalls: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(50, Duration::from_millis(100))
    }
}

/// Counts consecutive stalls against a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    stalls: u32,
}

impl RetryBudget {
    /// How long one attempt may wait before it counts as a stall.
    #[inline]
    pub fn delay(&self) -> Duration {
        self.policy.delay
    }

    /// Records a stall. Returns `false` once the budget is spent.
    pub fn stall(&mut self) -> bool {
        self.stalls += 1;
        self.stalls < self.policy.max_attempts
    }

    /// Forget earlier stalls after the operation made progress.
    #[inline]
    pub fn progressed(&mut self) {
        self.stalls = 0;
    }

    #[inline]
    pub fn stalls(&self) -> u32 {
        self.stalls
    }
}
