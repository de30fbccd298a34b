use patchbay::transport::{Script, ScriptedTransport, Transport};
use patchbay::{
    BatchKind, BatchOperation, BatchOptions, BatchOutcome, BundleDescriptor, BundleInfo,
    PatchError, PatchEvent, ProgressPublisher,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const HOST: &str = "http://cdn";

fn remote(names: &[&str]) -> Vec<BundleInfo> {
    names
        .iter()
        .map(|n| BundleInfo::remote(BundleDescriptor::new(*n, "ff", 100), HOST, HOST))
        .collect()
}

fn url(name: &str) -> String {
    format!("{}/{}", HOST, name)
}

fn new_batch(
    transport: &Arc<ScriptedTransport>,
    names: &[&str],
    options: BatchOptions,
    publisher: ProgressPublisher,
) -> BatchOperation {
    let transport: Arc<dyn Transport> = transport.clone();
    BatchOperation::new(BatchKind::Download, remote(names), transport, options, publisher)
        .unwrap()
}

/// Poll once per simulated second until done or `max_ticks` runs out
fn drive(batch: &mut BatchOperation, start: Instant, max_ticks: u64) {
    for tick in 0..max_ticks {
        if batch.poll_at(start + Duration::from_secs(tick)).is_done {
            return;
        }
    }
}

#[test]
fn test_concurrency_never_exceeds_limit() {
    let names = ["a", "b", "c", "d", "e", "f"];
    let mut transport = ScriptedTransport::new();
    for name in names {
        transport = transport.script(
            url(name),
            [Script::Succeed {
                bytes: 100,
                polls: 3,
            }],
        );
    }
    let transport = Arc::new(transport);
    let mut batch = new_batch(
        &transport,
        &names,
        BatchOptions::default().with_concurrency_limit(2),
        ProgressPublisher::noop(),
    );

    let start = Instant::now();
    for tick in 0..50 {
        let progress = batch.poll_at(start + Duration::from_millis(tick * 10));
        assert!(progress.in_flight <= 2);
        assert!(transport.live() <= 2);
        if progress.is_done {
            break;
        }
    }

    let progress = batch.progress();
    assert!(progress.is_succeeded);
    assert_eq!(progress.succeeded, 6);
    assert_eq!(progress.downloaded_bytes, 600);
    assert!(transport.max_live() <= 2);
    assert_eq!(transport.issued(), 6);
}

#[test]
fn test_abort_releases_every_transfer() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script(url("a"), [Script::Stall])
            .script(url("b"), [Script::Stall]),
    );
    let (publisher, subscriber) = ProgressPublisher::unbounded();
    let mut batch = new_batch(
        &transport,
        &["a", "b", "c"],
        BatchOptions::default().with_concurrency_limit(2),
        publisher,
    );

    batch.poll_at(Instant::now());
    assert_eq!(batch.active_transfers(), 2);
    assert_eq!(transport.live(), 2);

    batch.abort();
    let progress = batch.progress();
    assert!(progress.is_done);
    assert!(!progress.is_succeeded);
    assert_eq!(progress.pending, 0);
    assert_eq!(progress.in_flight, 0);
    assert_eq!(batch.active_transfers(), 0);
    assert_eq!(transport.live(), 0);
    assert_eq!(batch.outcome(), Some(BatchOutcome::Aborted));
    assert!(matches!(batch.result(), Err(PatchError::Aborted)));

    // Aborted units publish no failure events
    let events = subscriber.drain();
    assert!(!events
        .iter()
        .any(|e| matches!(e, PatchEvent::UnitFailed { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        PatchEvent::BatchFinished {
            outcome: BatchOutcome::Aborted,
            ..
        }
    )));

    // A second abort and further polls change nothing
    batch.abort();
    assert!(batch.poll().is_done);
    assert_eq!(transport.issued(), 2);
}

#[test]
fn test_retry_budget_counts_requests() {
    let transport = Arc::new(ScriptedTransport::new().script(url("a"), [Script::fail(503, "busy")]));
    let mut batch = new_batch(
        &transport,
        &["a"],
        BatchOptions::default()
            .with_retry_budget(2)
            .with_retry_cooldown(Duration::from_secs(1)),
        ProgressPublisher::noop(),
    );

    drive(&mut batch, Instant::now(), 20);

    assert!(batch.progress().is_done);
    assert_eq!(transport.issued(), 3);
    match batch.result() {
        Err(PatchError::TransferFailed { bundle, code, .. }) => {
            assert_eq!(bundle, "a");
            assert_eq!(code, 503);
        }
        other => panic!("expected TransferFailed, got {:?}", other),
    }
}

#[test]
fn test_zero_budget_fails_on_first_error() {
    let transport = Arc::new(ScriptedTransport::new().script(url("a"), [Script::fail(404, "gone")]));
    let mut batch = new_batch(
        &transport,
        &["a"],
        BatchOptions::default().with_retry_budget(0),
        ProgressPublisher::noop(),
    );

    let start = Instant::now();
    batch.poll_at(start);
    let progress = batch.poll_at(start);

    assert!(progress.is_done);
    assert_eq!(progress.failed, 1);
    assert_eq!(transport.issued(), 1);
}

#[test]
fn test_recovery_after_transient_failures() {
    let transport = Arc::new(ScriptedTransport::new().script(
        url("a"),
        [
            Script::fail(500, "oops"),
            Script::fail(502, "bad gateway"),
            Script::succeed(100),
        ],
    ));
    let (publisher, subscriber) = ProgressPublisher::unbounded();
    let mut batch = new_batch(
        &transport,
        &["a"],
        BatchOptions::default().with_retry_budget(3),
        publisher,
    );

    drive(&mut batch, Instant::now(), 20);

    let progress = batch.progress();
    assert!(progress.is_succeeded);
    assert_eq!(progress.downloaded_bytes, 100);
    assert_eq!(transport.issued(), 3);

    let retries = subscriber
        .drain()
        .into_iter()
        .filter(|e| matches!(e, PatchEvent::UnitRetrying { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[test]
fn test_first_failure_aborts_siblings() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script(url("a"), [Script::fail(404, "gone")])
            .script(url("b"), [Script::Stall]),
    );
    let mut batch = new_batch(
        &transport,
        &["a", "b", "c"],
        BatchOptions::default()
            .with_concurrency_limit(2)
            .with_retry_budget(0),
        ProgressPublisher::noop(),
    );

    drive(&mut batch, Instant::now(), 5);

    assert_eq!(batch.outcome(), Some(BatchOutcome::Failed));
    assert_eq!(transport.live(), 0);
    // "c" was still queued and never requested
    assert_eq!(transport.issued(), 2);

    let residual: Vec<String> = batch
        .residual()
        .iter()
        .map(|b| b.name().to_string())
        .collect();
    assert_eq!(residual, vec!["a", "b", "c"]);
    assert_eq!(batch.failure().map(|(name, _)| name), Some("a"));

    // The queued "c" is counted alongside the failed and aborted units
    let progress = batch.progress();
    assert_eq!(progress.succeeded, 0);
    assert_eq!(progress.failed, 3);
    assert_eq!(progress.succeeded + progress.failed, batch.items().len());
}

#[test]
fn test_abort_counts_queued_items_as_failed() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .script(url("a"), [Script::Stall])
            .script(url("b"), [Script::Stall]),
    );
    let (publisher, subscriber) = ProgressPublisher::unbounded();
    let mut batch = new_batch(
        &transport,
        &["a", "b", "c", "d"],
        BatchOptions::default().with_concurrency_limit(2),
        publisher,
    );

    batch.poll_at(Instant::now());
    assert_eq!(batch.progress().pending, 2);
    batch.abort();

    let progress = batch.progress();
    assert_eq!(progress.pending, 0);
    assert_eq!(progress.failed, 4);
    assert_eq!(progress.succeeded + progress.failed, batch.items().len());
    assert_eq!(transport.issued(), 2);

    let finished = subscriber.drain().into_iter().find_map(|e| match e {
        PatchEvent::BatchFinished { succeeded, failed, .. } => Some((succeeded, failed)),
        _ => None,
    });
    assert_eq!(finished, Some((0, 4)));
}

#[test]
fn test_stalled_transfer_times_out() {
    let transport = Arc::new(ScriptedTransport::new().script(url("a"), [Script::Stall]));
    let mut batch = new_batch(
        &transport,
        &["a"],
        BatchOptions::default()
            .with_retry_budget(0)
            .with_timeout(Duration::from_secs(5)),
        ProgressPublisher::noop(),
    );

    let start = Instant::now();
    assert!(!batch.poll_at(start).is_done);
    assert!(!batch.poll_at(start + Duration::from_secs(2)).is_done);

    batch.poll_at(start + Duration::from_secs(6));
    let progress = batch.poll_at(start + Duration::from_secs(6));
    assert!(progress.is_done);
    assert_eq!(transport.live(), 0);
    let (_, error) = batch.failure().unwrap();
    assert_eq!(error.code, 0);
    assert!(error.message.contains("timeout"));
}

#[test]
fn test_fallback_host_every_third_request() {
    let items = vec![BundleInfo::remote(
        BundleDescriptor::new("a", "ff", 1),
        "http://main",
        "http://backup",
    )];
    let transport = Arc::new(
        ScriptedTransport::new()
            .script("http://main/a", [Script::fail(503, "busy")])
            .script("http://backup/a", [Script::fail(503, "busy")]),
    );
    let shared: Arc<dyn Transport> = transport.clone();
    let mut batch = BatchOperation::new(
        BatchKind::Download,
        items,
        shared,
        BatchOptions::default().with_retry_budget(5),
        ProgressPublisher::noop(),
    )
    .unwrap();

    drive(&mut batch, Instant::now(), 20);

    assert_eq!(
        transport.requests(),
        vec![
            "http://main/a",
            "http://main/a",
            "http://backup/a",
            "http://main/a",
            "http://main/a",
            "http://backup/a",
        ]
    );
}
