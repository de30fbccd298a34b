//! Patchbay Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! Building blocks for transfer units that must survive flaky networks without
//! holding a concurrency slot forever:
//!
//! - **Stall Detector**: fails a transfer whose byte count stops growing, no
//!   matter how long the transfer has been running in total
//! - **Retry Budget**: bounded retries separated by a fixed cool-down
//!
//! # Key Principles
//!
//! This crate is **pure logic**. Nothing here sleeps, spawns or reads a clock
//! on its own: every call takes the current [`std::time::Instant`] from the
//! caller, which keeps cooperative pollers deterministic and testable.
//!
//! ```text
//!   transfer ──bytes──▶ StallDetector ──Stalled──▶ treat as transient error
//!                                                        │
//!                                                        ▼
//!                              RetryBudget ──Ready──▶ re-issue request
//!                                   │
//!                               Exhausted ──▶ permanent failure
//! ```
//!
//! # Usage Example
//!
//! ```
//! use patchbay_core_resilience::{RetryBudget, RetryDecision, StallDetector, StallStatus};
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut stall = StallDetector::new(Duration::from_secs(30));
//! stall.reset(start);
//! assert_eq!(stall.observe(1024, start + Duration::from_secs(5)), StallStatus::Progressing);
//!
//! let mut budget = RetryBudget::new(2, Duration::from_secs(1));
//! assert!(matches!(budget.poll(start), RetryDecision::CoolingDown { .. }));
//! assert_eq!(budget.poll(start + Duration::from_secs(1)), RetryDecision::Ready);
//! assert_eq!(budget.remaining(), 1);
//! ```

pub mod retry;
pub mod stall;

// Re-export main types for convenience
pub use retry::{RetryBudget, RetryDecision, DEFAULT_RETRY_COOLDOWN};
pub use stall::{StallDetector, StallStatus};

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::retry::{RetryBudget, RetryDecision};
    pub use super::stall::{StallDetector, StallStatus};
}
