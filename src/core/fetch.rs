/*!
 * Fetch unit: drives one bundle transfer to a terminal state
 *
 * ```text
 * Idle -> Preparing -> Requesting -> Checking -> Succeeded -> Done
 *            ^                           |
 *            |                           v
 *            +-------- Retrying <--------+----> Failed -> Done
 * ```
 *
 * The unit never blocks. `advance(now)` runs every transition that can happen
 * at `now` and returns; a unit waiting on its transfer or on a retry
 * cool-down simply stays put until the next tick.
 */

use patchbay_core_resilience::{RetryBudget, RetryDecision, StallDetector};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::bundle::BundleInfo;
use crate::core::progress::{PatchEvent, ProgressPublisher};
use crate::error::{ABORT_CODE, ABORT_MESSAGE};
use crate::transport::{Payload, Transfer, TransferRequest, TransferStatus, Transport};

/// Every third request goes to the fallback host
const FALLBACK_EVERY: u32 = 3;

/// Lifecycle state of a fetch unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Preparing,
    Requesting,
    Checking,
    Succeeded,
    Retrying,
    Failed,
    Done,
}

impl FetchState {
    /// States during which the unit holds a transfer
    pub fn is_active(&self) -> bool {
        matches!(self, FetchState::Requesting | FetchState::Checking)
    }
}

/// Error code and message of a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitError {
    pub code: i64,
    pub message: String,
}

impl UnitError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn user_abort() -> Self {
        Self::new(ABORT_CODE, ABORT_MESSAGE)
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// Per-unit tuning, taken from the owning batch
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub retry_budget: u32,
    pub timeout: Duration,
    pub retry_cooldown: Duration,
}

/// One bundle, one transfer at a time, retried within a budget
pub struct FetchUnit {
    info: BundleInfo,
    transport: Arc<dyn Transport>,
    publisher: ProgressPublisher,
    state: FetchState,
    retain_payload: bool,

    stall: StallDetector,
    retry: RetryBudget,
    request_count: u32,
    current_url: String,
    started_at: Option<Instant>,

    transfer: Option<Box<dyn Transfer>>,
    attempt: Option<Result<(), UnitError>>,
    payload: Option<Payload>,

    downloaded_bytes: u64,
    fraction: f32,
    error: Option<UnitError>,
    aborted: bool,
}

impl fmt::Debug for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchUnit")
            .field("bundle", &self.info.name())
            .field("state", &self.state)
            .field("request_count", &self.request_count)
            .field("downloaded_bytes", &self.downloaded_bytes)
            .field("error", &self.error)
            .finish()
    }
}

impl FetchUnit {
    pub fn new(
        info: BundleInfo,
        transport: Arc<dyn Transport>,
        options: FetchOptions,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            info,
            transport,
            publisher,
            state: FetchState::Idle,
            retain_payload: false,
            stall: StallDetector::new(options.timeout),
            retry: RetryBudget::new(options.retry_budget, options.retry_cooldown),
            request_count: 0,
            current_url: String::new(),
            started_at: None,
            transfer: None,
            attempt: None,
            payload: None,
            downloaded_bytes: 0,
            fraction: 0.0,
            error: None,
            aborted: false,
        }
    }

    /// Leave `Idle`. `retain_payload` keeps the transfer result for the caller.
    pub fn start(&mut self, retain_payload: bool) {
        if self.state == FetchState::Idle {
            self.retain_payload = retain_payload;
            self.state = FetchState::Preparing;
        }
    }

    /// Run every transition possible at `now`
    pub fn advance(&mut self, now: Instant) {
        loop {
            let next = match self.state {
                FetchState::Idle | FetchState::Done => None,
                FetchState::Preparing => Some(self.prepare(now)),
                FetchState::Requesting => self.request(now),
                FetchState::Checking => Some(self.check()),
                FetchState::Retrying => self.retry(now),
                FetchState::Succeeded => Some(self.succeed()),
                FetchState::Failed => Some(self.fail()),
            };
            match next {
                Some(state) => {
                    debug!(bundle = %self.info.name(), from = ?self.state, to = ?state, "fetch transition");
                    self.state = state;
                }
                None => break,
            }
        }
    }

    /// Force `Failed` with the user-abort error; no-op once terminal
    pub fn abort(&mut self) {
        if matches!(
            self.state,
            FetchState::Succeeded | FetchState::Failed | FetchState::Done
        ) {
            return;
        }
        self.aborted = true;
        self.release_transfer();
        self.error = Some(UnitError::user_abort());
        self.state = self.fail();
    }

    fn prepare(&mut self, now: Instant) -> FetchState {
        self.downloaded_bytes = 0;
        self.fraction = 0.0;
        self.attempt = None;
        self.started_at = Some(now);
        self.stall.reset(now);

        self.request_count += 1;
        self.current_url = if self.request_count % FALLBACK_EVERY == 0 {
            self.info.fallback_url.clone()
        } else {
            self.info.main_url.clone()
        };

        self.publisher.publish(PatchEvent::unit_started(
            self.info.name(),
            &self.current_url,
            self.request_count,
        ));
        FetchState::Requesting
    }

    fn request(&mut self, now: Instant) -> Option<FetchState> {
        if self.transfer.is_none() {
            let request = TransferRequest {
                url: self.current_url.clone(),
                bundle: self.info.descriptor.clone(),
            };
            self.transfer = Some(self.transport.begin(&request));
        }
        let transfer = self.transfer.as_mut()?;

        // Status first so a finished transfer reports its final byte count
        let status = transfer.status();
        let progress = transfer.progress();
        self.downloaded_bytes = progress.bytes;
        self.fraction = progress.fraction;

        match status {
            TransferStatus::InProgress => {
                if !self.stall.observe(progress.bytes, now).is_stalled() {
                    return None;
                }
                transfer.dispose();
                self.attempt = Some(Err(UnitError::new(
                    0,
                    format!(
                        "timeout: no progress for {:?} from {}",
                        self.stall.timeout(),
                        self.current_url
                    ),
                )));
            }
            TransferStatus::Succeeded => self.attempt = Some(Ok(())),
            TransferStatus::Failed { code, message } => {
                self.attempt = Some(Err(UnitError::new(code, message)))
            }
        }
        Some(FetchState::Checking)
    }

    fn check(&mut self) -> FetchState {
        let attempt = self
            .attempt
            .take()
            .unwrap_or_else(|| Err(UnitError::new(0, "transfer vanished")));

        if let Some(mut transfer) = self.transfer.take() {
            if attempt.is_ok() && self.retain_payload {
                self.payload = transfer.take_payload();
            }
            transfer.dispose();
        }

        match attempt {
            Ok(()) => {
                // A successful retry must not report an earlier attempt's error
                self.error = None;
                FetchState::Succeeded
            }
            Err(err) => {
                self.error = Some(err);
                FetchState::Retrying
            }
        }
    }

    fn retry(&mut self, now: Instant) -> Option<FetchState> {
        match self.retry.poll(now) {
            RetryDecision::Exhausted => Some(FetchState::Failed),
            RetryDecision::CoolingDown { .. } => None,
            RetryDecision::Ready => {
                let (code, message) = self
                    .error
                    .as_ref()
                    .map(|e| (e.code, e.message.as_str()))
                    .unwrap_or((0, ""));
                warn!(
                    "Retrying {} (bundle {}, code {}, {} retries left): {}",
                    self.current_url,
                    self.info.name(),
                    code,
                    self.retry.remaining(),
                    message
                );
                self.publisher.publish(PatchEvent::unit_retrying(
                    self.info.name(),
                    &self.current_url,
                    code,
                    message,
                    self.retry.remaining(),
                ));
                Some(FetchState::Preparing)
            }
        }
    }

    fn succeed(&mut self) -> FetchState {
        self.publisher
            .publish(PatchEvent::unit_succeeded(self.info.name(), self.downloaded_bytes));
        FetchState::Done
    }

    fn fail(&mut self) -> FetchState {
        self.release_transfer();
        self.payload = None;
        let error = self
            .error
            .get_or_insert_with(|| UnitError::new(0, "failed without error"));
        if !self.aborted {
            warn!(
                "Bundle {} failed after {} request(s): {}",
                self.info.name(),
                self.request_count,
                error
            );
            self.publisher.publish(PatchEvent::unit_failed(
                self.info.name(),
                error.code,
                &error.message,
            ));
        }
        FetchState::Done
    }

    fn release_transfer(&mut self) {
        if let Some(mut transfer) = self.transfer.take() {
            transfer.dispose();
        }
        self.attempt = None;
    }

    pub fn info(&self) -> &BundleInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == FetchState::Done
    }

    pub fn is_succeeded(&self) -> bool {
        self.is_done() && self.error.is_none()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Last recorded error; cleared by a successful attempt
    pub fn error(&self) -> Option<&UnitError> {
        self.error.as_ref()
    }

    /// Bytes received by the current (or final) attempt
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Requests issued so far, including retries
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Retry cycles started so far
    pub fn retries_used(&self) -> u32 {
        self.retry.consumed()
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// When the current attempt was prepared
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Hand over the retained payload, if one was requested and produced
    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::ProgressPublisher;
    use crate::transport::{Script, ScriptedTransport};
    use patchbay_core_manifest::BundleDescriptor;

    const MAIN: &str = "http://main/ui.bundle";
    const FALLBACK: &str = "http://backup/ui.bundle";

    fn info() -> BundleInfo {
        BundleInfo::remote(
            BundleDescriptor::new("ui", "00", 10).with_file_name("ui.bundle"),
            "http://main",
            "http://backup",
        )
    }

    fn options(retry_budget: u32) -> FetchOptions {
        FetchOptions {
            retry_budget,
            timeout: Duration::from_secs(5),
            retry_cooldown: Duration::from_secs(1),
        }
    }

    fn unit(transport: &Arc<ScriptedTransport>, retry_budget: u32) -> FetchUnit {
        let transport: Arc<dyn Transport> = transport.clone();
        FetchUnit::new(info(), transport, options(retry_budget), ProgressPublisher::noop())
    }

    #[test]
    fn test_idle_until_started() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut unit = unit(&transport, 0);
        unit.advance(Instant::now());
        assert_eq!(unit.state(), FetchState::Idle);
        assert_eq!(transport.issued(), 0);
    }

    #[test]
    fn test_success_in_one_tick() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut unit = unit(&transport, 3);
        unit.start(false);
        unit.advance(Instant::now());

        assert!(unit.is_succeeded());
        assert_eq!(unit.downloaded_bytes(), 10);
        assert_eq!(transport.live(), 0);
        assert!(unit.take_payload().is_none());
    }

    #[test]
    fn test_retained_payload_survives_checking() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut unit = unit(&transport, 0);
        unit.start(true);
        unit.advance(Instant::now());

        let payload = unit.take_payload().unwrap();
        assert_eq!(payload.bundle, "ui");
        assert_eq!(payload.bytes.len(), 10);
        assert_eq!(transport.live(), 0);
    }

    #[test]
    fn test_zero_budget_fails_after_first_check() {
        let transport = Arc::new(ScriptedTransport::new().script(MAIN, [Script::fail(500, "boom")]));
        let mut unit = unit(&transport, 0);
        unit.start(false);
        unit.advance(Instant::now());

        assert!(unit.is_done());
        assert!(!unit.is_succeeded());
        assert_eq!(unit.retries_used(), 0);
        assert_eq!(transport.issued(), 1);
        assert_eq!(unit.error(), Some(&UnitError::new(500, "boom")));
    }

    #[test]
    fn test_retry_waits_for_cooldown() {
        let transport = Arc::new(
            ScriptedTransport::new().script(MAIN, [Script::fail(503, "busy"), Script::succeed(10)]),
        );
        let mut unit = unit(&transport, 2);
        let t0 = Instant::now();
        unit.start(false);

        unit.advance(t0);
        assert_eq!(unit.state(), FetchState::Retrying);
        unit.advance(t0 + Duration::from_millis(500));
        assert_eq!(unit.state(), FetchState::Retrying);
        assert_eq!(transport.issued(), 1);

        unit.advance(t0 + Duration::from_secs(1));
        assert!(unit.is_succeeded());
        assert_eq!(unit.error(), None);
        assert_eq!(unit.retries_used(), 1);
        assert_eq!(transport.issued(), 2);
    }

    #[test]
    fn test_every_third_request_uses_fallback() {
        let transport = Arc::new(ScriptedTransport::new().script(MAIN, [Script::fail(503, "busy")]));
        let mut unit = unit(&transport, 3);
        let t0 = Instant::now();
        unit.start(false);
        for step in 0..4u64 {
            unit.advance(t0 + Duration::from_secs(step));
        }

        assert!(unit.is_succeeded());
        assert_eq!(transport.requests(), vec![MAIN, MAIN, FALLBACK]);
        assert_eq!(unit.current_url(), FALLBACK);
    }

    #[test]
    fn test_stall_is_a_retryable_timeout() {
        let transport = Arc::new(ScriptedTransport::new().script(MAIN, [Script::Stall]));
        let mut unit = unit(&transport, 0);
        let t0 = Instant::now();
        unit.start(false);

        unit.advance(t0);
        unit.advance(t0 + Duration::from_secs(5));
        assert_eq!(unit.state(), FetchState::Requesting);
        assert_eq!(transport.live(), 1);

        unit.advance(t0 + Duration::from_secs(6));
        assert!(unit.is_done());
        let err = unit.error().unwrap();
        assert_eq!(err.code, 0);
        assert!(err.message.contains("timeout"));
        assert_eq!(transport.live(), 0);
    }

    #[test]
    fn test_slow_progress_does_not_time_out() {
        let transport = Arc::new(
            ScriptedTransport::new().script(MAIN, [Script::Succeed { bytes: 10, polls: 5 }]),
        );
        let mut unit = unit(&transport, 0);
        let t0 = Instant::now();
        unit.start(false);

        // Each tick is 4s apart against a 5s window, 20s in total
        for step in 0..5u64 {
            unit.advance(t0 + Duration::from_secs(step * 4));
        }
        assert!(unit.is_succeeded());
    }

    #[test]
    fn test_abort_is_terminal_and_idempotent() {
        let (publisher, subscriber) = ProgressPublisher::unbounded();
        let transport = Arc::new(ScriptedTransport::new().script(MAIN, [Script::Stall]));
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let mut unit = FetchUnit::new(info(), dyn_transport, options(3), publisher);
        unit.start(false);
        unit.advance(Instant::now());
        assert_eq!(transport.live(), 1);

        unit.abort();
        unit.abort();
        assert!(unit.is_done());
        assert!(unit.is_aborted());
        assert_eq!(unit.error(), Some(&UnitError::new(0, "user abort")));
        assert_eq!(transport.live(), 0);

        let events = subscriber.drain();
        assert!(!events
            .iter()
            .any(|e| matches!(e, PatchEvent::UnitFailed { .. })));
    }

    #[test]
    fn test_abort_after_success_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut unit = unit(&transport, 0);
        unit.start(false);
        unit.advance(Instant::now());
        unit.abort();
        assert!(unit.is_succeeded());
        assert!(!unit.is_aborted());
    }
}
