//! Stall detection: progress-based timeouts
//!
//! A wall-clock deadline punishes large transfers that are merely slow. The
//! stall detector instead bounds how long a transfer may go *without making
//! progress*: the window restarts every time the observed byte count grows.
//!
//! # Example
//!
//! ```
//! use patchbay_core_resilience::stall::{StallDetector, StallStatus};
//! use std::time::{Duration, Instant};
//!
//! let t0 = Instant::now();
//! let mut detector = StallDetector::new(Duration::from_secs(10));
//! detector.reset(t0);
//!
//! // Slow but steady: never stalls
//! for step in 1..=5u64 {
//!     let now = t0 + Duration::from_secs(step * 9);
//!     assert_eq!(detector.observe(step * 100, now), StallStatus::Progressing);
//! }
//!
//! // Stuck at 500 bytes for longer than the window
//! let later = t0 + Duration::from_secs(45 + 11);
//! assert!(detector.observe(500, later).is_stalled());
//! ```

use std::time::{Duration, Instant};

/// Result of feeding one byte-count sample to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallStatus {
    /// The byte count grew since the previous sample
    Progressing,
    /// No growth, but still inside the window
    Idle { idle_for: Duration },
    /// No growth for longer than the window
    Stalled { idle_for: Duration },
}

impl StallStatus {
    pub fn is_stalled(&self) -> bool {
        matches!(self, StallStatus::Stalled { .. })
    }
}

/// Tracks the last time a transfer's byte count increased
#[derive(Debug, Clone)]
pub struct StallDetector {
    timeout: Duration,
    last_bytes: u64,
    last_progress_at: Option<Instant>,
}

impl StallDetector {
    /// Create a detector with the given no-progress window
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_bytes: 0,
            last_progress_at: None,
        }
    }

    /// The configured no-progress window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a fresh window (new request)
    pub fn reset(&mut self, now: Instant) {
        self.last_bytes = 0;
        self.last_progress_at = Some(now);
    }

    /// Feed the current byte count
    pub fn observe(&mut self, bytes: u64, now: Instant) -> StallStatus {
        let since = *self.last_progress_at.get_or_insert(now);

        if bytes > self.last_bytes {
            self.last_bytes = bytes;
            self.last_progress_at = Some(now);
            return StallStatus::Progressing;
        }

        let idle_for = now.saturating_duration_since(since);
        if idle_for > self.timeout {
            tracing::trace!(?idle_for, bytes, "transfer stalled");
            StallStatus::Stalled { idle_for }
        } else {
            StallStatus::Idle { idle_for }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_within_window() {
        let t0 = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(5));
        detector.reset(t0);

        let status = detector.observe(0, t0 + Duration::from_secs(5));
        assert_eq!(
            status,
            StallStatus::Idle {
                idle_for: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_stalls_after_window() {
        let t0 = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(5));
        detector.reset(t0);

        assert!(detector
            .observe(0, t0 + Duration::from_millis(5001))
            .is_stalled());
    }

    #[test]
    fn test_progress_restarts_window() {
        let t0 = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(5));
        detector.reset(t0);

        assert_eq!(
            detector.observe(10, t0 + Duration::from_secs(4)),
            StallStatus::Progressing
        );
        // 8s after start but only 4s after the last increase
        assert!(!detector.observe(10, t0 + Duration::from_secs(8)).is_stalled());
        assert!(detector.observe(10, t0 + Duration::from_secs(10)).is_stalled());
    }

    #[test]
    fn test_reset_clears_byte_baseline() {
        let t0 = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(1));
        detector.reset(t0);
        detector.observe(500, t0);

        let t1 = t0 + Duration::from_secs(3);
        detector.reset(t1);
        // A retried request starts from zero again; any bytes count as progress
        assert_eq!(detector.observe(1, t1), StallStatus::Progressing);
    }

    #[test]
    fn test_observe_without_reset_starts_window() {
        let t0 = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(1));
        assert!(!detector.observe(0, t0).is_stalled());
        assert!(detector.observe(0, t0 + Duration::from_secs(2)).is_stalled());
    }
}
