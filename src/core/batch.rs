/*!
 * Batch operation: a bounded pool of fetch units over one work list
 *
 * The same pool drives downloads (HTTP transport) and unpacks (local
 * transport). At most `concurrency_limit` units are in flight; pending items
 * are admitted in work-list order as slots free up.
 *
 * Failure is strict: the first unit to fail permanently aborts every other
 * unit and fails the batch. [`BatchOperation::residual`] returns what did not
 * succeed so a caller can start a fresh batch for the remainder.
 *
 * # Example
 *
 * ```
 * use patchbay::core::batch::{BatchKind, BatchOperation, BatchOptions};
 * use patchbay::core::progress::ProgressPublisher;
 * use patchbay::transport::{ScriptedTransport, Transport};
 * use std::sync::Arc;
 *
 * let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new());
 * let mut batch = BatchOperation::new(
 *     BatchKind::Download,
 *     Vec::new(),
 *     transport,
 *     BatchOptions::default(),
 *     ProgressPublisher::noop(),
 * )
 * .unwrap();
 *
 * // An empty work list is done before the first poll
 * let progress = batch.poll();
 * assert!(progress.is_done && progress.is_succeeded);
 * ```
 */

use patchbay_core_resilience::DEFAULT_RETRY_COOLDOWN;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bundle::BundleInfo;
use crate::core::fetch::{FetchOptions, FetchUnit, UnitError};
use crate::core::progress::ProgressPublisher;
use crate::error::{PatchError, Result};
use crate::transport::{Payload, Transport};

pub use crate::core::progress::{BatchKind, BatchOutcome};

/// Tuning for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum units in flight; must be at least 1
    pub concurrency_limit: usize,
    /// Retries per unit
    pub retry_budget: u32,
    /// No-progress window per transfer
    pub timeout: Duration,
    /// Pause before each retry
    pub retry_cooldown: Duration,
    /// Keep transfer payloads for [`BatchOperation::take_payloads`]
    pub retain_payload: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            retry_budget: 3,
            timeout: Duration::from_secs(60),
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            retain_payload: false,
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    pub fn with_retain_payload(mut self, retain: bool) -> Self {
        self.retain_payload = retain;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(PatchError::Config(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            retry_budget: self.retry_budget,
            timeout: self.timeout,
            retry_cooldown: self.retry_cooldown,
        }
    }
}

/// Aggregate snapshot, recomputed on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchProgress {
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub is_done: bool,
    pub is_succeeded: bool,
}

impl BatchProgress {
    /// Downloaded share of the total, 0.0 ..= 1.0
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            if self.is_done {
                1.0
            } else {
                0.0
            }
        } else {
            (self.downloaded_bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchStatus {
    Running,
    Finished(BatchOutcome),
}

struct Completed {
    index: usize,
    succeeded: bool,
    bytes: u64,
    payload: Option<Payload>,
}

/// Drives a work list to completion with at most K concurrent units
pub struct BatchOperation {
    kind: BatchKind,
    options: BatchOptions,
    transport: Arc<dyn Transport>,
    publisher: ProgressPublisher,

    items: Vec<BundleInfo>,
    pending: VecDeque<usize>,
    in_flight: Vec<(usize, FetchUnit)>,
    completed: Vec<Completed>,

    total_bytes: u64,
    status: BatchStatus,
    failure: Option<(String, UnitError)>,
    started_at: Instant,
}

impl BatchOperation {
    /// Create a batch over `items`; an empty list is immediately succeeded
    pub fn new(
        kind: BatchKind,
        items: Vec<BundleInfo>,
        transport: Arc<dyn Transport>,
        options: BatchOptions,
        publisher: ProgressPublisher,
    ) -> Result<Self> {
        options.validate()?;

        let total_bytes = items.iter().map(BundleInfo::size).fold(0u64, u64::saturating_add);
        let mut batch = Self {
            kind,
            options,
            transport,
            publisher,
            pending: (0..items.len()).collect(),
            items,
            in_flight: Vec::new(),
            completed: Vec::new(),
            total_bytes,
            status: BatchStatus::Running,
            failure: None,
            started_at: Instant::now(),
        };

        debug!(
            "Created {} batch: {} bundles, {} bytes, concurrency {}",
            kind,
            batch.items.len(),
            total_bytes,
            batch.options.concurrency_limit
        );

        if batch.items.is_empty() {
            batch.finish(BatchOutcome::Succeeded);
        }
        Ok(batch)
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// The full work list, in admission order
    pub fn items(&self) -> &[BundleInfo] {
        &self.items
    }

    /// Advance the batch at the current instant
    pub fn poll(&mut self) -> BatchProgress {
        self.poll_at(Instant::now())
    }

    /// Advance the batch as if the current instant were `now`.
    ///
    /// One tick: advance in-flight units, reap finished ones, then admit
    /// pending items while there is room.
    pub fn poll_at(&mut self, now: Instant) -> BatchProgress {
        if self.status != BatchStatus::Running {
            return self.progress();
        }

        for (_, unit) in self.in_flight.iter_mut() {
            unit.advance(now);
        }

        if let Some(failed) = self.reap() {
            let unit_error = failed.1.clone();
            warn!(
                "Bundle {} failed permanently ({}); aborting {} batch",
                failed.0, unit_error, self.kind
            );
            self.failure = Some(failed);
            self.abort_units();
            self.finish(BatchOutcome::Failed);
            return self.progress();
        }

        self.admit(now);

        if self.pending.is_empty() && self.in_flight.is_empty() {
            self.finish(BatchOutcome::Succeeded);
        }
        self.progress()
    }

    /// Move finished units out of the in-flight set; returns the first failure
    fn reap(&mut self) -> Option<(String, UnitError)> {
        let mut failure = None;
        let mut i = 0;
        while i < self.in_flight.len() {
            if !self.in_flight[i].1.is_done() {
                i += 1;
                continue;
            }
            let (index, mut unit) = self.in_flight.swap_remove(i);
            let succeeded = unit.is_succeeded();
            if !succeeded && failure.is_none() {
                let error = unit
                    .error()
                    .cloned()
                    .unwrap_or_else(|| UnitError::new(0, "unknown failure"));
                failure = Some((unit.name().to_string(), error));
            }
            self.completed.push(Completed {
                index,
                succeeded,
                bytes: unit.downloaded_bytes(),
                payload: unit.take_payload(),
            });
        }
        failure
    }

    fn admit(&mut self, now: Instant) {
        while self.in_flight.len() < self.options.concurrency_limit {
            let Some(index) = self.pending.pop_front() else {
                break;
            };
            let mut unit = FetchUnit::new(
                self.items[index].clone(),
                Arc::clone(&self.transport),
                self.options.fetch_options(),
                self.publisher.clone(),
            );
            unit.start(self.options.retain_payload);
            unit.advance(now);
            self.in_flight.push((index, unit));
        }
    }

    /// Abort every in-flight and pending item. No-op once the batch is done.
    pub fn abort(&mut self) {
        if self.status != BatchStatus::Running {
            return;
        }
        info!("Aborting {} batch", self.kind);
        self.abort_units();
        self.finish(BatchOutcome::Aborted);
    }

    fn abort_units(&mut self) {
        for (index, mut unit) in self.in_flight.drain(..) {
            unit.abort();
            self.completed.push(Completed {
                index,
                succeeded: unit.is_succeeded(),
                bytes: unit.downloaded_bytes(),
                payload: unit.take_payload(),
            });
        }
        // Never-started items end as failed so the counts cover the work list
        for index in self.pending.drain(..) {
            self.completed.push(Completed {
                index,
                succeeded: false,
                bytes: 0,
                payload: None,
            });
        }
    }

    fn finish(&mut self, outcome: BatchOutcome) {
        self.status = BatchStatus::Finished(outcome);
        let progress = self.progress();
        info!(
            "{} batch {:?}: {}/{} succeeded, {} failed, {} bytes in {:?}",
            self.kind,
            outcome,
            progress.succeeded,
            self.items.len(),
            progress.failed,
            progress.downloaded_bytes,
            self.started_at.elapsed()
        );
        self.publisher.batch_finished(
            self.kind,
            progress.succeeded,
            progress.failed,
            progress.total_bytes,
            progress.downloaded_bytes,
            outcome,
        );
    }

    /// Current aggregate, without advancing anything
    pub fn progress(&self) -> BatchProgress {
        let succeeded = self.completed.iter().filter(|c| c.succeeded).count();
        let failed = self.completed.len() - succeeded;
        let done_bytes: u64 = self
            .completed
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.bytes)
            .sum();
        let live_bytes: u64 = self
            .in_flight
            .iter()
            .map(|(_, unit)| unit.downloaded_bytes())
            .sum();

        BatchProgress {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            succeeded,
            failed,
            total_bytes: self.total_bytes,
            downloaded_bytes: done_bytes + live_bytes,
            is_done: self.status != BatchStatus::Running,
            is_succeeded: self.status == BatchStatus::Finished(BatchOutcome::Succeeded),
        }
    }

    /// Terminal outcome, once done
    pub fn outcome(&self) -> Option<BatchOutcome> {
        match self.status {
            BatchStatus::Running => None,
            BatchStatus::Finished(outcome) => Some(outcome),
        }
    }

    /// Units currently in flight, for inspection
    pub fn in_flight_units(&self) -> impl Iterator<Item = &FetchUnit> {
        self.in_flight.iter().map(|(_, unit)| unit)
    }

    /// Number of units holding a transfer right now
    pub fn active_transfers(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|(_, unit)| unit.state().is_active())
            .count()
    }

    /// Bundle name and error of the unit that failed the batch
    pub fn failure(&self) -> Option<(&str, &UnitError)> {
        self.failure.as_ref().map(|(name, err)| (name.as_str(), err))
    }

    /// The failure as an error value; `Ok` while running or after success
    pub fn result(&self) -> Result<()> {
        match self.outcome() {
            Some(BatchOutcome::Aborted) => Err(PatchError::Aborted),
            Some(BatchOutcome::Failed) => {
                let (bundle, error) = self
                    .failure()
                    .map(|(b, e)| (b.to_string(), e.clone()))
                    .unwrap_or_else(|| (String::new(), UnitError::new(0, "unknown failure")));
                Err(PatchError::TransferFailed {
                    bundle,
                    code: error.code,
                    message: error.message,
                })
            }
            _ => Ok(()),
        }
    }

    /// Every item that has not succeeded, in work-list order
    pub fn residual(&self) -> Vec<BundleInfo> {
        let succeeded: HashSet<usize> = self
            .completed
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.index)
            .collect();
        self.items
            .iter()
            .enumerate()
            .filter(|(i, _)| !succeeded.contains(i))
            .map(|(_, info)| info.clone())
            .collect()
    }

    /// Retained payloads of succeeded units, in work-list order
    pub fn take_payloads(&mut self) -> Vec<Payload> {
        let mut done: Vec<&mut Completed> = self.completed.iter_mut().collect();
        done.sort_by_key(|c| c.index);
        done.into_iter().filter_map(|c| c.payload.take()).collect()
    }

    /// Poll every `tick` until the batch is done
    pub async fn run(&mut self, tick: Duration) -> BatchProgress {
        loop {
            let progress = self.poll();
            if progress.is_done {
                return progress;
            }
            tokio::time::sleep(tick).await;
        }
    }
}

impl std::fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOperation")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("progress", &self.progress())
            .finish()
    }
}
