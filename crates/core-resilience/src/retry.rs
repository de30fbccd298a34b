//! Retry budget with a fixed cool-down between attempts
//!
//! Unlike an exponential penalty schedule, a transfer unit retries after the
//! same short pause every time and gives up once its budget is spent. The
//! budget is cooperative: the caller polls it each tick and the budget answers
//! whether to keep waiting, retry now, or give up.
//!
//! # Example
//!
//! ```
//! use patchbay_core_resilience::retry::{RetryBudget, RetryDecision};
//! use std::time::{Duration, Instant};
//!
//! let t0 = Instant::now();
//! let mut budget = RetryBudget::new(1, Duration::from_secs(1));
//!
//! // First failure: wait out the cool-down, then retry
//! assert!(matches!(budget.poll(t0), RetryDecision::CoolingDown { .. }));
//! assert_eq!(budget.poll(t0 + Duration::from_secs(1)), RetryDecision::Ready);
//!
//! // Second failure: nothing left
//! assert_eq!(budget.poll(t0 + Duration::from_secs(5)), RetryDecision::Exhausted);
//! ```

use std::time::{Duration, Instant};

/// Default pause between a failed attempt and its retry
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(1);

/// Answer from [`RetryBudget::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// No retries left; the failure is permanent
    Exhausted,
    /// A retry is owed but the cool-down has not elapsed
    CoolingDown { remaining: Duration },
    /// Retry now; one unit of budget has been consumed
    Ready,
}

/// Bounded retry counter with a fixed cool-down
#[derive(Debug, Clone)]
pub struct RetryBudget {
    remaining: u32,
    cooldown: Duration,
    waiting_since: Option<Instant>,
    consumed: u32,
}

impl RetryBudget {
    /// Create a budget of `retries` retries separated by `cooldown`
    pub fn new(retries: u32, cooldown: Duration) -> Self {
        Self {
            remaining: retries,
            cooldown,
            waiting_since: None,
            consumed: 0,
        }
    }

    /// Retries still available
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Retries already spent
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether a cool-down is currently running
    pub fn is_cooling_down(&self) -> bool {
        self.waiting_since.is_some()
    }

    /// Poll after a failed attempt.
    ///
    /// The first poll of a cycle starts the cool-down clock. `Ready` consumes
    /// one retry and re-arms the budget for the next failure.
    pub fn poll(&mut self, now: Instant) -> RetryDecision {
        if self.remaining == 0 {
            self.waiting_since = None;
            return RetryDecision::Exhausted;
        }

        let since = *self.waiting_since.get_or_insert(now);
        let waited = now.saturating_duration_since(since);
        if waited < self.cooldown {
            return RetryDecision::CoolingDown {
                remaining: self.cooldown - waited,
            };
        }

        self.remaining -= 1;
        self.consumed += 1;
        self.waiting_since = None;
        tracing::trace!(remaining = self.remaining, "retry budget consumed");
        RetryDecision::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_exhausted_immediately() {
        let mut budget = RetryBudget::new(0, Duration::from_secs(1));
        assert!(budget.is_exhausted());
        assert_eq!(budget.poll(Instant::now()), RetryDecision::Exhausted);
        assert_eq!(budget.consumed(), 0);
    }

    #[test]
    fn test_cooldown_then_ready() {
        let t0 = Instant::now();
        let mut budget = RetryBudget::new(3, Duration::from_millis(1000));

        assert_eq!(
            budget.poll(t0),
            RetryDecision::CoolingDown {
                remaining: Duration::from_millis(1000)
            }
        );
        assert!(budget.is_cooling_down());
        assert_eq!(
            budget.poll(t0 + Duration::from_millis(400)),
            RetryDecision::CoolingDown {
                remaining: Duration::from_millis(600)
            }
        );
        assert_eq!(
            budget.poll(t0 + Duration::from_millis(1000)),
            RetryDecision::Ready
        );
        assert_eq!(budget.remaining(), 2);
        assert!(!budget.is_cooling_down());
    }

    #[test]
    fn test_each_cycle_restarts_cooldown() {
        let t0 = Instant::now();
        let mut budget = RetryBudget::new(2, Duration::from_secs(1));

        budget.poll(t0);
        assert_eq!(budget.poll(t0 + Duration::from_secs(1)), RetryDecision::Ready);

        // Next failure much later: the clock starts at that poll, not at t0
        let t1 = t0 + Duration::from_secs(30);
        assert!(matches!(budget.poll(t1), RetryDecision::CoolingDown { .. }));
        assert_eq!(budget.poll(t1 + Duration::from_secs(1)), RetryDecision::Ready);

        assert_eq!(budget.poll(t1 + Duration::from_secs(10)), RetryDecision::Exhausted);
        assert_eq!(budget.consumed(), 2);
    }

    #[test]
    fn test_zero_cooldown_is_ready_on_first_poll() {
        let mut budget = RetryBudget::new(1, Duration::ZERO);
        assert_eq!(budget.poll(Instant::now()), RetryDecision::Ready);
        assert!(budget.is_exhausted());
    }
}
