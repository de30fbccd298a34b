/*!
 * Deterministic scripted transport
 *
 * Needs no runtime and no network. Each URL has a queue of scripts; every
 * request to that URL consumes the next one, and the last script repeats.
 * URLs without a script succeed after one poll with the bundle's size.
 */

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Payload, Transfer, TransferProgress, TransferRequest, TransferStatus, Transport};

/// Behaviour of one scripted transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Report `bytes` in even steps and succeed on status poll number `polls`
    Succeed { bytes: u64, polls: u32 },
    /// Fail on the first status poll
    Fail { code: i64, message: String },
    /// Stay in progress forever without moving a byte
    Stall,
}

impl Script {
    pub fn succeed(bytes: u64) -> Self {
        Script::Succeed { bytes, polls: 1 }
    }

    pub fn fail(code: i64, message: impl Into<String>) -> Self {
        Script::Fail {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// Transport whose transfers follow per-URL scripts
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    requests: Mutex<Vec<String>>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `scripts` for successive requests to `url`
    pub fn script<I>(self, url: impl Into<String>, scripts: I) -> Self
    where
        I: IntoIterator<Item = Script>,
    {
        lock(&self.scripts)
            .entry(url.into())
            .or_default()
            .extend(scripts);
        self
    }

    /// Total transfers issued so far
    pub fn issued(&self) -> usize {
        self.counters.issued.load(Ordering::SeqCst)
    }

    /// Transfers issued and not yet disposed
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live transfers observed
    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    /// Every requested URL, in request order
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    fn next_script(&self, request: &TransferRequest) -> Script {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Script::succeed(request.bundle.size)),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Script::succeed(request.bundle.size)),
            None => Script::succeed(request.bundle.size),
        }
    }
}

impl Transport for ScriptedTransport {
    fn begin(&self, request: &TransferRequest) -> Box<dyn Transfer> {
        let script = self.next_script(request);
        lock(&self.requests).push(request.url.clone());

        let counters = Arc::clone(&self.counters);
        counters.issued.fetch_add(1, Ordering::SeqCst);
        let live = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_live.fetch_max(live, Ordering::SeqCst);

        Box::new(ScriptedTransfer {
            bundle: request.bundle.name.clone(),
            script,
            polls: AtomicU32::new(0),
            counters,
            payload_taken: false,
            disposed: false,
        })
    }
}

struct ScriptedTransfer {
    bundle: String,
    script: Script,
    polls: AtomicU32,
    counters: Arc<Counters>,
    payload_taken: bool,
    disposed: bool,
}

impl Transfer for ScriptedTransfer {
    fn progress(&self) -> TransferProgress {
        match &self.script {
            Script::Succeed { bytes, polls } => {
                let seen = u64::from(self.polls.load(Ordering::SeqCst).min(*polls));
                let total = u64::from((*polls).max(1));
                TransferProgress::new(bytes * seen / total, *bytes)
            }
            Script::Fail { .. } | Script::Stall => TransferProgress::default(),
        }
    }

    fn status(&self) -> TransferStatus {
        if self.disposed {
            return TransferStatus::Failed {
                code: 0,
                message: "transfer disposed".to_string(),
            };
        }
        let seen = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.script {
            Script::Succeed { polls, .. } if seen >= *polls => TransferStatus::Succeeded,
            Script::Succeed { .. } | Script::Stall => TransferStatus::InProgress,
            Script::Fail { code, message } => TransferStatus::Failed {
                code: *code,
                message: message.clone(),
            },
        }
    }

    fn take_payload(&mut self) -> Option<Payload> {
        match &self.script {
            Script::Succeed { bytes, polls }
                if !self.payload_taken && self.polls.load(Ordering::SeqCst) >= *polls =>
            {
                self.payload_taken = true;
                Some(Payload {
                    bundle: self.bundle.clone(),
                    bytes: Bytes::from(vec![0u8; *bytes as usize]),
                    path: None,
                })
            }
            _ => None,
        }
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedTransfer {
    fn drop(&mut self) {
        self.dispose();
    }
}
