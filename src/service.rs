/*!
 * Patch service: the façade a session uses to plan and run batches
 */

use patchbay_core_manifest::{AssetInfo, Manifest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::bundle::BundleInfo;
use crate::config::PatchConfig;
use crate::core::batch::{BatchKind, BatchOperation, BatchOptions};
use crate::core::progress::ProgressPublisher;
use crate::core::worklist::WorkListBuilder;
use crate::error::{PatchError, Result};
use crate::query::{BuildinQuery, CacheQuery, FsBuildin, FsCache};
use crate::transport::{HttpTransport, LocalUnpackTransport, Transport};

/// Which bundles a downloader covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSelection {
    All,
    Tags(Vec<String>),
    /// The listed assets plus their transitive dependencies
    Assets(Vec<AssetInfo>),
}

/// Which build-in bundles an unpacker covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackSelection {
    All,
    Tags(Vec<String>),
}

/// Creates downloaders and unpackers over one manifest
pub struct PatchService {
    manifest: Arc<Manifest>,
    cache: Arc<dyn CacheQuery>,
    buildin: Arc<dyn BuildinQuery>,
    default_host: String,
    fallback_host: String,
    buildin_root: PathBuf,
    download_transport: Arc<dyn Transport>,
    unpack_transport: Arc<dyn Transport>,
    publisher: ProgressPublisher,
}

impl std::fmt::Debug for PatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchService")
            .field("package", &self.manifest.package_name)
            .field("default_host", &self.default_host)
            .field("fallback_host", &self.fallback_host)
            .field("buildin_root", &self.buildin_root)
            .finish()
    }
}

impl PatchService {
    pub fn builder(manifest: Arc<Manifest>) -> PatchServiceBuilder {
        PatchServiceBuilder::new(manifest)
    }

    /// Wire the filesystem cache, build-in directory, HTTP and local
    /// transports from configuration. Must run inside a tokio runtime.
    pub fn from_config(config: &PatchConfig, manifest: Arc<Manifest>) -> Result<Self> {
        config.validate()?;
        let http = HttpTransport::new()?
            .with_cache_dir(&config.cache_dir)
            .with_verify_hash(config.verify_hash);
        let local = LocalUnpackTransport::new(&config.cache_dir)?;

        Self::builder(manifest)
            .cache(FsCache::new(&config.cache_dir))
            .buildin(FsBuildin::new(&config.buildin_dir))
            .hosts(&config.default_host, config.effective_fallback_host())
            .buildin_root(&config.buildin_dir)
            .download_transport(http)
            .unpack_transport(local)
            .build()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn publisher(&self) -> &ProgressPublisher {
        &self.publisher
    }

    /// Route events of batches created from now on to `publisher`
    pub fn with_publisher(mut self, publisher: ProgressPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    fn worklist(&self) -> WorkListBuilder<'_> {
        WorkListBuilder::new(&self.manifest, self.cache.as_ref(), self.buildin.as_ref())
            .with_hosts(&self.default_host, &self.fallback_host)
            .with_buildin_root(&self.buildin_root)
    }

    /// The download work list, without starting anything
    pub fn plan_download(&self, selection: &DownloadSelection) -> Result<Vec<BundleInfo>> {
        let builder = self.worklist();
        match selection {
            DownloadSelection::All => Ok(builder.by_all()),
            DownloadSelection::Tags(tags) => Ok(builder.by_tags(tags.as_slice())),
            DownloadSelection::Assets(assets) => builder.by_paths(assets),
        }
    }

    /// The unpack work list, without starting anything
    pub fn plan_unpack(&self, selection: &UnpackSelection) -> Vec<BundleInfo> {
        let builder = self.worklist();
        match selection {
            UnpackSelection::All => builder.unpack_by_all(),
            UnpackSelection::Tags(tags) => builder.unpack_by_tags(tags.as_slice()),
        }
    }

    pub fn create_downloader(
        &self,
        selection: DownloadSelection,
        options: BatchOptions,
    ) -> Result<BatchOperation> {
        let items = self.plan_download(&selection)?;
        info!("Downloader for {:?}: {} bundles", selection, items.len());
        BatchOperation::new(
            BatchKind::Download,
            items,
            Arc::clone(&self.download_transport),
            options,
            self.publisher.clone(),
        )
    }

    pub fn create_unpacker(
        &self,
        selection: UnpackSelection,
        options: BatchOptions,
    ) -> Result<BatchOperation> {
        let items = self.plan_unpack(&selection);
        info!("Unpacker for {:?}: {} bundles", selection, items.len());
        BatchOperation::new(
            BatchKind::Unpack,
            items,
            Arc::clone(&self.unpack_transport),
            options,
            self.publisher.clone(),
        )
    }

    pub fn create_downloader_by_all(&self, options: BatchOptions) -> Result<BatchOperation> {
        self.create_downloader(DownloadSelection::All, options)
    }

    pub fn create_downloader_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        options: BatchOptions,
    ) -> Result<BatchOperation> {
        let tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self.create_downloader(DownloadSelection::Tags(tags), options)
    }

    pub fn create_downloader_by_paths(
        &self,
        assets: &[AssetInfo],
        options: BatchOptions,
    ) -> Result<BatchOperation> {
        self.create_downloader(DownloadSelection::Assets(assets.to_vec()), options)
    }

    pub fn create_unpacker_by_all(&self, options: BatchOptions) -> Result<BatchOperation> {
        self.create_unpacker(UnpackSelection::All, options)
    }

    pub fn create_unpacker_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        options: BatchOptions,
    ) -> Result<BatchOperation> {
        let tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self.create_unpacker(UnpackSelection::Tags(tags), options)
    }

    /// Producer-side reference for `path`; unknown paths come back invalid
    pub fn asset_info(&self, path: &str) -> AssetInfo {
        self.manifest.asset_info(path)
    }

    fn check_asset(&self, asset: &AssetInfo) -> Result<()> {
        if let Some(reason) = &asset.error {
            return Err(PatchError::invalid_asset(&asset.path, reason));
        }
        if !self.manifest.contains_asset(&asset.path) {
            return Err(PatchError::invalid_asset(
                &asset.path,
                "not listed in the manifest",
            ));
        }
        Ok(())
    }

    /// The owning bundle of `asset`, classified for this session
    pub fn resolve_bundle(&self, asset: &AssetInfo) -> Result<BundleInfo> {
        self.check_asset(asset)?;
        let main = self.manifest.main_bundle(&asset.path)?;
        Ok(self.worklist().classify(main))
    }

    /// Every dependency bundle of `asset`, classified for this session
    pub fn resolve_dependencies(&self, asset: &AssetInfo) -> Result<Vec<BundleInfo>> {
        self.check_asset(asset)?;
        let builder = self.worklist();
        Ok(self
            .manifest
            .all_dependencies(&asset.path)?
            .into_iter()
            .map(|b| builder.classify(b))
            .collect())
    }
}

/// Builder for [`PatchService`]
pub struct PatchServiceBuilder {
    manifest: Arc<Manifest>,
    cache: Option<Arc<dyn CacheQuery>>,
    buildin: Option<Arc<dyn BuildinQuery>>,
    default_host: String,
    fallback_host: Option<String>,
    buildin_root: PathBuf,
    download_transport: Option<Arc<dyn Transport>>,
    unpack_transport: Option<Arc<dyn Transport>>,
    publisher: ProgressPublisher,
}

impl PatchServiceBuilder {
    fn new(manifest: Arc<Manifest>) -> Self {
        Self {
            manifest,
            cache: None,
            buildin: None,
            default_host: String::new(),
            fallback_host: None,
            buildin_root: PathBuf::new(),
            download_transport: None,
            unpack_transport: None,
            publisher: ProgressPublisher::noop(),
        }
    }

    pub fn cache(mut self, cache: impl CacheQuery + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn buildin(mut self, buildin: impl BuildinQuery + 'static) -> Self {
        self.buildin = Some(Arc::new(buildin));
        self
    }

    /// Primary and fallback host roots
    pub fn hosts(mut self, host: impl Into<String>, fallback_host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self.fallback_host = Some(fallback_host.into());
        self
    }

    /// Primary host only; the fallback is the same host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }

    pub fn buildin_root(mut self, root: impl AsRef<Path>) -> Self {
        self.buildin_root = root.as_ref().to_path_buf();
        self
    }

    pub fn download_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.download_transport = Some(Arc::new(transport));
        self
    }

    pub fn unpack_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.unpack_transport = Some(Arc::new(transport));
        self
    }

    /// Share a transport the caller keeps a handle to
    pub fn shared_download_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.download_transport = Some(transport);
        self
    }

    pub fn shared_unpack_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.unpack_transport = Some(transport);
        self
    }

    pub fn publisher(mut self, publisher: ProgressPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Missing cache or build-in queries default to "nothing present"
    pub fn build(self) -> Result<PatchService> {
        let download_transport = self
            .download_transport
            .ok_or_else(|| PatchError::Config("no download transport configured".into()))?;
        let unpack_transport = self
            .unpack_transport
            .ok_or_else(|| PatchError::Config("no unpack transport configured".into()))?;
        let nothing: Arc<dyn CacheQuery> = Arc::new(|_: &patchbay_core_manifest::BundleDescriptor| false);
        let no_buildin: Arc<dyn BuildinQuery> =
            Arc::new(|_: &patchbay_core_manifest::BundleDescriptor| false);

        let fallback_host = self
            .fallback_host
            .unwrap_or_else(|| self.default_host.clone());

        Ok(PatchService {
            manifest: self.manifest,
            cache: self.cache.unwrap_or(nothing),
            buildin: self.buildin.unwrap_or(no_buildin),
            default_host: self.default_host,
            fallback_host,
            buildin_root: self.buildin_root,
            download_transport,
            unpack_transport,
            publisher: self.publisher,
        })
    }
}
