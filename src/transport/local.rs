/*!
 * Local unpack transport: copies build-in bundles into the cache
 */

use patchbay_core_manifest::BundleDescriptor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;

use super::http::{body_buffer, check_received, persist, verify_body};
use super::{Payload, TaskFailure, TaskShared, TaskTransfer, Transfer, TransferRequest, Transport};
use crate::error::{PatchError, Result};

const READ_CHUNK: usize = 64 * 1024;

/// Reads the file named by the request URL (a local path) and writes it to
/// the cache directory. Same progress and status contract as HTTP.
#[derive(Clone)]
pub struct LocalUnpackTransport {
    runtime: Handle,
    cache_dir: PathBuf,
    verify_hash: bool,
}

impl LocalUnpackTransport {
    /// Create a transport on the current tokio runtime
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PatchError::Runtime(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(runtime, cache_dir))
    }

    pub fn with_runtime(runtime: Handle, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            cache_dir: cache_dir.into(),
            verify_hash: false,
        }
    }

    /// Check the BLAKE3 hash of build-in files against the manifest
    pub fn with_verify_hash(mut self, verify: bool) -> Self {
        self.verify_hash = verify;
        self
    }
}

impl Transport for LocalUnpackTransport {
    fn begin(&self, request: &TransferRequest) -> Box<dyn Transfer> {
        let source = PathBuf::from(&request.url);
        let bundle = request.bundle.clone();
        let cache_dir = self.cache_dir.clone();
        let verify_hash = self.verify_hash;

        Box::new(TaskTransfer::spawn(
            &self.runtime,
            request.bundle.size,
            move |shared| async move { unpack(source, bundle, cache_dir, shared, verify_hash).await },
        ))
    }
}

async fn unpack(
    source: PathBuf,
    bundle: BundleDescriptor,
    cache_dir: PathBuf,
    shared: Arc<TaskShared>,
    verify_hash: bool,
) -> std::result::Result<Payload, TaskFailure> {
    let read_failure =
        |e: std::io::Error| TaskFailure::network(format!("reading {} failed: {}", source.display(), e));

    let mut file = tokio::fs::File::open(&source).await.map_err(read_failure)?;
    let mut body = body_buffer(bundle.size);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut chunk).await.map_err(read_failure)?;
        if n == 0 {
            break;
        }
        check_received(&bundle, (body.len() + n) as u64)?;
        shared.add_bytes(n as u64);
        body.extend_from_slice(&chunk[..n]);
    }
    let body = body.freeze();

    verify_body(&bundle, &body, verify_hash)?;
    let path = persist(&cache_dir, bundle.file_name(), &body).await?;

    Ok(Payload {
        bundle: bundle.name,
        bytes: body,
        path: Some(path),
    })
}
