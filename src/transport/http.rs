/*!
 * HTTP bundle transport (reqwest on a tokio runtime)
 */

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use patchbay_core_manifest::BundleDescriptor;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use super::{Payload, TaskFailure, TaskShared, TaskTransfer, Transfer, TransferRequest, Transport};
use crate::error::{PatchError, Result};

/// Upper bound on the buffer reserved up front from a declared size
const MAX_PREALLOC: usize = 64 * 1024;

/// Fetches bundles with GET requests on a tokio runtime.
///
/// `begin` may be called from any thread; the request itself runs on the
/// runtime captured at construction.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    runtime: Handle,
    cache_dir: Option<PathBuf>,
    verify_hash: bool,
}

impl HttpTransport {
    /// Create a transport on the current tokio runtime
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PatchError::Runtime(format!("no tokio runtime: {}", e)))?;
        Self::with_runtime(runtime)
    }

    /// Create a transport that spawns its requests on `runtime`
    pub fn with_runtime(runtime: Handle) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("patchbay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PatchError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            runtime,
            cache_dir: None,
            verify_hash: true,
        })
    }

    /// Persist completed bundles under `dir`
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Check the BLAKE3 hash of completed bodies against the manifest
    pub fn with_verify_hash(mut self, verify: bool) -> Self {
        self.verify_hash = verify;
        self
    }
}

impl Transport for HttpTransport {
    fn begin(&self, request: &TransferRequest) -> Box<dyn Transfer> {
        let client = self.client.clone();
        let url = request.url.clone();
        let bundle = request.bundle.clone();
        let cache_dir = self.cache_dir.clone();
        let verify_hash = self.verify_hash;

        debug!("GET {} for bundle {}", url, bundle.name);
        Box::new(TaskTransfer::spawn(
            &self.runtime,
            request.bundle.size,
            move |shared| async move {
                fetch(client, url, bundle, shared, verify_hash, cache_dir).await
            },
        ))
    }
}

async fn fetch(
    client: Client,
    url: String,
    bundle: BundleDescriptor,
    shared: Arc<TaskShared>,
    verify_hash: bool,
    cache_dir: Option<PathBuf>,
) -> std::result::Result<Payload, TaskFailure> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TaskFailure::network(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TaskFailure {
            code: i64::from(status.as_u16()),
            message: format!("HTTP {} from {}", status, url),
        });
    }

    let mut body = body_buffer(bundle.size);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| TaskFailure::network(format!("reading {} failed: {}", url, e)))?;
        check_received(&bundle, (body.len() + chunk.len()) as u64)?;
        shared.add_bytes(chunk.len() as u64);
        body.extend_from_slice(&chunk);
    }
    let body = body.freeze();

    verify_body(&bundle, &body, verify_hash)?;

    let path = match cache_dir {
        Some(dir) => Some(persist(&dir, bundle.file_name(), &body).await?),
        None => None,
    };

    Ok(Payload {
        bundle: bundle.name,
        bytes: body,
        path,
    })
}

/// Empty body buffer sized for `declared` bytes, capped at `MAX_PREALLOC`
pub(crate) fn body_buffer(declared: u64) -> BytesMut {
    let capacity = usize::try_from(declared).map_or(MAX_PREALLOC, |n| n.min(MAX_PREALLOC));
    BytesMut::with_capacity(capacity)
}

/// Fails once `received` bytes run past a non-zero declared size
pub(crate) fn check_received(
    bundle: &BundleDescriptor,
    received: u64,
) -> std::result::Result<(), TaskFailure> {
    if bundle.size > 0 && received > bundle.size {
        return Err(TaskFailure::network(format!(
            "bundle {} exceeds declared size of {} bytes",
            bundle.name, bundle.size
        )));
    }
    Ok(())
}

/// Size and content-hash checks for a completed body
pub(crate) fn verify_body(
    bundle: &BundleDescriptor,
    body: &Bytes,
    verify_hash: bool,
) -> std::result::Result<(), TaskFailure> {
    if bundle.size > 0 && body.len() as u64 != bundle.size {
        return Err(TaskFailure::network(format!(
            "size mismatch for bundle {}: expected {} bytes, got {}",
            bundle.name,
            bundle.size,
            body.len()
        )));
    }
    if verify_hash && !bundle.hash.is_empty() {
        let actual = hex::encode(blake3::hash(body).as_bytes());
        if !actual.eq_ignore_ascii_case(&bundle.hash) {
            return Err(TaskFailure::network(format!(
                "hash mismatch for bundle {}: expected {}, got {}",
                bundle.name, bundle.hash, actual
            )));
        }
    }
    Ok(())
}

/// Write `body` as `dir/file_name` via a `.part` file and rename
pub(crate) async fn persist(
    dir: &Path,
    file_name: &str,
    body: &[u8],
) -> std::result::Result<PathBuf, TaskFailure> {
    let target = dir.join(file_name);
    let part = dir.join(format!("{}.part", file_name));
    let io_failure = |e: std::io::Error| {
        TaskFailure::network(format!("writing {} failed: {}", target.display(), e))
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_failure)?;
    }
    tokio::fs::write(&part, body).await.map_err(io_failure)?;
    tokio::fs::rename(&part, &target).await.map_err(io_failure)?;
    Ok(target)
}
