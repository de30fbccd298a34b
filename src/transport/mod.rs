/*!
 * Low-level transfer primitives polled by fetch units
 *
 * A [`Transport`] issues one [`Transfer`] per request. The transfer is never
 * awaited: the owning unit polls `progress()` and `status()` every tick and
 * disposes the transfer once it is done with it.
 */

pub mod http;
pub mod local;
pub mod mock;

pub use http::HttpTransport;
pub use local::LocalUnpackTransport;
pub use mock::{Script, ScriptedTransport};

use bytes::Bytes;
use patchbay_core_manifest::BundleDescriptor;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// What to fetch and which bundle it is for
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Remote URL, or a local path for unpack transports
    pub url: String,
    pub bundle: BundleDescriptor,
}

/// Snapshot of transfer progress
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransferProgress {
    /// 0.0 ..= 1.0, based on the expected size
    pub fraction: f32,
    pub bytes: u64,
}

impl TransferProgress {
    pub fn new(bytes: u64, expected: u64) -> Self {
        let fraction = if expected == 0 {
            0.0
        } else {
            (bytes as f64 / expected as f64).min(1.0) as f32
        };
        Self { fraction, bytes }
    }
}

/// Terminal or in-progress status of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress,
    Succeeded,
    /// Code is the HTTP status for HTTP errors, 0 for network or local errors
    Failed { code: i64, message: String },
}

/// Retained result of a successful transfer; dropping it releases it
#[derive(Debug, Clone)]
pub struct Payload {
    pub bundle: String,
    pub bytes: Bytes,
    /// Where the bundle was persisted, if anywhere
    pub path: Option<PathBuf>,
}

/// One issued transfer, polled until it reports a terminal status
pub trait Transfer: Send {
    fn progress(&self) -> TransferProgress;

    fn status(&self) -> TransferStatus;

    /// Hand over the payload of a succeeded transfer (at most once)
    fn take_payload(&mut self) -> Option<Payload>;

    /// Release the transfer, cancelling it if still running. Idempotent.
    fn dispose(&mut self);
}

/// Source of transfers
pub trait Transport: Send + Sync {
    fn begin(&self, request: &TransferRequest) -> Box<dyn Transfer>;
}

/// Failure produced inside a transfer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskFailure {
    pub code: i64,
    pub message: String,
}

impl TaskFailure {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
        }
    }
}

/// State shared between a spawned transfer task and its polling handle
#[derive(Debug, Default)]
pub(crate) struct TaskShared {
    bytes: AtomicU64,
    outcome: Mutex<Option<std::result::Result<(), TaskFailure>>>,
    payload: Mutex<Option<Payload>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TaskShared {
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn finish(&self, outcome: std::result::Result<Payload, TaskFailure>) {
        // Payload first: a reader that sees Ok must find it
        let outcome = outcome.map(|payload| {
            *lock(&self.payload) = Some(payload);
        });
        *lock(&self.outcome) = Some(outcome);
    }
}

/// A transfer driven by a tokio task, observed through atomics
pub(crate) struct TaskTransfer {
    shared: Arc<TaskShared>,
    expected: u64,
    handle: Option<JoinHandle<()>>,
    disposed: bool,
}

impl TaskTransfer {
    /// Spawn `work` on `runtime`; its result becomes the transfer status
    pub fn spawn<F, Fut>(runtime: &Handle, expected: u64, work: F) -> Self
    where
        F: FnOnce(Arc<TaskShared>) -> Fut,
        Fut: Future<Output = std::result::Result<Payload, TaskFailure>> + Send + 'static,
    {
        let shared = Arc::new(TaskShared::default());
        let fut = work(Arc::clone(&shared));
        let task_shared = Arc::clone(&shared);
        let handle = runtime.spawn(async move {
            let outcome = fut.await;
            task_shared.finish(outcome);
        });
        Self {
            shared,
            expected,
            handle: Some(handle),
            disposed: false,
        }
    }
}

impl Transfer for TaskTransfer {
    fn progress(&self) -> TransferProgress {
        TransferProgress::new(self.shared.bytes(), self.expected)
    }

    fn status(&self) -> TransferStatus {
        if self.disposed {
            return TransferStatus::Failed {
                code: 0,
                message: "transfer disposed".to_string(),
            };
        }
        match &*lock(&self.shared.outcome) {
            None => TransferStatus::InProgress,
            Some(Ok(())) => TransferStatus::Succeeded,
            Some(Err(failure)) => TransferStatus::Failed {
                code: failure.code,
                message: failure.message.clone(),
            },
        }
    }

    fn take_payload(&mut self) -> Option<Payload> {
        lock(&self.shared.payload).take()
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        lock(&self.shared.payload).take();
    }
}

impl Drop for TaskTransfer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        assert_eq!(TransferProgress::new(50, 100).fraction, 0.5);
        assert_eq!(TransferProgress::new(150, 100).fraction, 1.0);
        assert_eq!(TransferProgress::new(10, 0).fraction, 0.0);
    }

    #[tokio::test]
    async fn test_task_transfer_reports_outcome() {
        let handle = Handle::current();
        let mut transfer = TaskTransfer::spawn(&handle, 3, |shared| async move {
            shared.add_bytes(3);
            Ok(Payload {
                bundle: "ui".into(),
                bytes: Bytes::from_static(b"abc"),
                path: None,
            })
        });

        while transfer.status() == TransferStatus::InProgress {
            tokio::task::yield_now().await;
        }
        assert_eq!(transfer.status(), TransferStatus::Succeeded);
        assert_eq!(transfer.progress().bytes, 3);

        let payload = transfer.take_payload().unwrap();
        assert_eq!(&payload.bytes[..], b"abc");
        assert!(transfer.take_payload().is_none());
        assert_eq!(transfer.status(), TransferStatus::Succeeded);

        transfer.dispose();
        transfer.dispose();
        assert!(matches!(transfer.status(), TransferStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_task_transfer_failure() {
        let handle = Handle::current();
        let transfer = TaskTransfer::spawn(&handle, 10, |_| async move {
            Err(TaskFailure {
                code: 404,
                message: "HTTP 404 Not Found".into(),
            })
        });

        while transfer.status() == TransferStatus::InProgress {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            transfer.status(),
            TransferStatus::Failed {
                code: 404,
                message: "HTTP 404 Not Found".into()
            }
        );
    }
}
