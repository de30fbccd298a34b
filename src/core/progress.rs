/*!
 * Patch event publisher for fetch and unpack monitoring
 *
 * Fetch units and batch operations publish lifecycle events here:
 * - unit start, retry warning, success and failure
 * - batch completion with its aggregate counters
 * - millisecond timestamps for telemetry
 *
 * Success and failure are each published at most once per unit. A user abort
 * publishes no unit failure; the batch reports it as `BatchOutcome::Aborted`.
 *
 * Publishing never blocks the polling thread. On a full bounded channel,
 * start and retry events are dropped, while terminal events wait in a side
 * queue that the subscriber reads after the channel.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which pool produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Download,
    Unpack,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Download => write!(f, "download"),
            BatchKind::Unpack => write!(f, "unpack"),
        }
    }
}

/// Terminal result of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,
    Failed,
    Aborted,
}

/// Patch event types
#[derive(Debug, Clone, PartialEq)]
pub enum PatchEvent {
    /// A unit issued a request (attempt counts from 1)
    UnitStarted {
        bundle: String,
        url: String,
        attempt: u32,
        timestamp: u64,
    },

    /// A failed attempt is about to be retried
    UnitRetrying {
        bundle: String,
        url: String,
        code: i64,
        message: String,
        retries_left: u32,
        timestamp: u64,
    },

    /// Unit reached terminal success
    UnitSucceeded {
        bundle: String,
        bytes: u64,
        timestamp: u64,
    },

    /// Unit failed permanently
    UnitFailed {
        bundle: String,
        code: i64,
        message: String,
        timestamp: u64,
    },

    /// Batch reached a terminal state
    BatchFinished {
        kind: BatchKind,
        succeeded: usize,
        failed: usize,
        total_bytes: u64,
        downloaded_bytes: u64,
        outcome: BatchOutcome,
        timestamp: u64,
    },
}

impl PatchEvent {
    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn unit_started(bundle: &str, url: &str, attempt: u32) -> Self {
        PatchEvent::UnitStarted {
            bundle: bundle.to_string(),
            url: url.to_string(),
            attempt,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn unit_retrying(bundle: &str, url: &str, code: i64, message: &str, retries_left: u32) -> Self {
        PatchEvent::UnitRetrying {
            bundle: bundle.to_string(),
            url: url.to_string(),
            code,
            message: message.to_string(),
            retries_left,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn unit_succeeded(bundle: &str, bytes: u64) -> Self {
        PatchEvent::UnitSucceeded {
            bundle: bundle.to_string(),
            bytes,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn unit_failed(bundle: &str, code: i64, message: &str) -> Self {
        PatchEvent::UnitFailed {
            bundle: bundle.to_string(),
            code,
            message: message.to_string(),
            timestamp: Self::current_timestamp(),
        }
    }

    /// Bundle name the event refers to, if it is a unit event
    pub fn bundle(&self) -> Option<&str> {
        match self {
            PatchEvent::UnitStarted { bundle, .. }
            | PatchEvent::UnitRetrying { bundle, .. }
            | PatchEvent::UnitSucceeded { bundle, .. }
            | PatchEvent::UnitFailed { bundle, .. } => Some(bundle),
            PatchEvent::BatchFinished { .. } => None,
        }
    }

    /// Unit success or failure, or batch completion
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PatchEvent::UnitSucceeded { .. }
                | PatchEvent::UnitFailed { .. }
                | PatchEvent::BatchFinished { .. }
        )
    }
}

/// Terminal events that did not fit in a full bounded channel
type Overflow = Arc<Mutex<VecDeque<PatchEvent>>>;

fn lock(overflow: &Overflow) -> MutexGuard<'_, VecDeque<PatchEvent>> {
    overflow.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event publisher - sends events to subscribers
#[derive(Clone, Default)]
pub struct ProgressPublisher {
    sender: Option<Sender<PatchEvent>>,
    overflow: Overflow,
}

impl fmt::Debug for ProgressPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressPublisher")
            .field("enabled", &self.sender.is_some())
            .finish()
    }
}

impl ProgressPublisher {
    /// Create a new publisher with bounded channel.
    ///
    /// While the channel is full, `UnitStarted` and `UnitRetrying` events are
    /// dropped. Success, failure and batch completion are never dropped.
    pub fn new(buffer_size: usize) -> (Self, ProgressSubscriber) {
        let (tx, rx) = bounded(buffer_size);
        Self::pair(tx, rx)
    }

    /// Create a new publisher with unbounded channel
    pub fn unbounded() -> (Self, ProgressSubscriber) {
        let (tx, rx) = unbounded();
        Self::pair(tx, rx)
    }

    fn pair(tx: Sender<PatchEvent>, rx: Receiver<PatchEvent>) -> (Self, ProgressSubscriber) {
        let overflow = Overflow::default();
        (
            ProgressPublisher {
                sender: Some(tx),
                overflow: Arc::clone(&overflow),
            },
            ProgressSubscriber {
                receiver: rx,
                overflow,
            },
        )
    }

    /// Create a no-op publisher (for when nobody listens)
    pub fn noop() -> Self {
        ProgressPublisher::default()
    }

    /// Publish an event without blocking
    pub fn publish(&self, event: PatchEvent) {
        let Some(ref tx) = self.sender else {
            return;
        };
        let mut overflow = lock(&self.overflow);

        // Held-back events go first so the subscriber sees publish order
        while let Some(held) = overflow.pop_front() {
            match tx.try_send(held) {
                Ok(()) => {}
                Err(TrySendError::Full(held)) => {
                    overflow.push_front(held);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    overflow.clear();
                    return;
                }
            }
        }

        let event = if overflow.is_empty() {
            match tx.try_send(event) {
                Err(TrySendError::Full(event)) => event,
                // Sent, or the subscriber is gone
                _ => return,
            }
        } else {
            event
        };
        if event.is_terminal() {
            overflow.push_back(event);
        }
    }

    pub fn batch_finished(
        &self,
        kind: BatchKind,
        succeeded: usize,
        failed: usize,
        total_bytes: u64,
        downloaded_bytes: u64,
        outcome: BatchOutcome,
    ) {
        self.publish(PatchEvent::BatchFinished {
            kind,
            succeeded,
            failed,
            total_bytes,
            downloaded_bytes,
            outcome,
            timestamp: PatchEvent::current_timestamp(),
        });
    }
}

/// Event subscriber - receives events
pub struct ProgressSubscriber {
    receiver: Receiver<PatchEvent>,
    overflow: Overflow,
}

impl ProgressSubscriber {
    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Option<PatchEvent> {
        let mut overflow = lock(&self.overflow);
        self.receiver.try_recv().ok().or_else(|| overflow.pop_front())
    }

    /// Receive an event (blocking); `None` once every publisher is gone
    pub fn recv(&self) -> Option<PatchEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        // Overflow only fills while the channel is full, so waiting here is safe
        match self.receiver.recv() {
            Ok(event) => Some(event),
            Err(_) => self.try_recv(),
        }
    }

    /// Everything published so far, without blocking
    pub fn drain(&self) -> Vec<PatchEvent> {
        let mut overflow = lock(&self.overflow);
        let mut events: Vec<PatchEvent> = self.receiver.try_iter().collect();
        events.extend(overflow.drain(..));
        events
    }
}

/// Shared publisher that can be cloned across threads
pub type SharedProgressPublisher = Arc<ProgressPublisher>;
