/*!
 * Work-list builder: which bundles need fetching or unpacking
 *
 * Every mode shares one eligibility filter:
 *
 * - fetch:  not cached and not build-in
 * - unpack: not cached and build-in
 *
 * Lists keep manifest order (or request order for asset paths) and never
 * contain a bundle twice.
 */

use patchbay_core_manifest::{AssetInfo, BundleDescriptor, Manifest};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::bundle::BundleInfo;
use crate::error::Result;
use crate::query::{BuildinQuery, CacheQuery};

/// Borrowed view over the manifest and the cache/build-in snapshots
pub struct WorkListBuilder<'a> {
    manifest: &'a Manifest,
    cache: &'a dyn CacheQuery,
    buildin: &'a dyn BuildinQuery,
    host: &'a str,
    fallback_host: &'a str,
    buildin_root: &'a Path,
}

impl<'a> WorkListBuilder<'a> {
    pub fn new(
        manifest: &'a Manifest,
        cache: &'a dyn CacheQuery,
        buildin: &'a dyn BuildinQuery,
    ) -> Self {
        Self {
            manifest,
            cache,
            buildin,
            host: "",
            fallback_host: "",
            buildin_root: Path::new(""),
        }
    }

    /// Host roots for remote URLs; the fallback may equal the primary
    pub fn with_hosts(mut self, host: &'a str, fallback_host: &'a str) -> Self {
        self.host = host;
        self.fallback_host = fallback_host;
        self
    }

    /// Directory holding build-in bundle files
    pub fn with_buildin_root(mut self, root: &'a Path) -> Self {
        self.buildin_root = root;
        self
    }

    fn fetch_eligible(&self, bundle: &BundleDescriptor) -> bool {
        !self.cache.is_cached(bundle) && !self.buildin.is_buildin(bundle)
    }

    fn unpack_eligible(&self, bundle: &BundleDescriptor) -> bool {
        !self.cache.is_cached(bundle) && self.buildin.is_buildin(bundle)
    }

    fn remote(&self, bundle: &BundleDescriptor) -> BundleInfo {
        BundleInfo::remote(bundle.clone(), self.host, self.fallback_host)
    }

    fn local(&self, bundle: &BundleDescriptor) -> BundleInfo {
        BundleInfo::buildin(bundle.clone(), self.buildin_root)
    }

    /// Classify one bundle: cached, then build-in, then remote
    pub fn classify(&self, bundle: &BundleDescriptor) -> BundleInfo {
        if self.cache.is_cached(bundle) {
            BundleInfo::cached(bundle.clone())
        } else if self.buildin.is_buildin(bundle) {
            self.local(bundle)
        } else {
            self.remote(bundle)
        }
    }

    /// Every bundle that must be downloaded
    pub fn by_all(&self) -> Vec<BundleInfo> {
        let list: Vec<BundleInfo> = self
            .manifest
            .bundles()
            .iter()
            .filter(|b| self.fetch_eligible(b))
            .map(|b| self.remote(b))
            .collect();
        debug!("download list (all): {} bundles", list.len());
        list
    }

    /// Bundles to download for `tags`; untagged bundles always qualify
    pub fn by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<BundleInfo> {
        let list: Vec<BundleInfo> = self
            .manifest
            .bundles()
            .iter()
            .filter(|b| tag_selected(b, tags) && self.fetch_eligible(b))
            .map(|b| self.remote(b))
            .collect();
        debug!("download list (tags): {} bundles", list.len());
        list
    }

    /// Bundles to download so `assets` and all their dependencies can load.
    ///
    /// An asset marked invalid by its producer is skipped with a warning. An
    /// asset the manifest does not know fails the whole call.
    pub fn by_paths(&self, assets: &[AssetInfo]) -> Result<Vec<BundleInfo>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut closure: Vec<&BundleDescriptor> = Vec::new();

        for asset in assets {
            if let Some(reason) = &asset.error {
                warn!("Skipping invalid asset reference {}: {}", asset.path, reason);
                continue;
            }
            let main = self.manifest.main_bundle(&asset.path)?;
            let deps = self.manifest.all_dependencies(&asset.path)?;
            for bundle in std::iter::once(main).chain(deps) {
                if seen.insert(bundle.name.as_str()) {
                    closure.push(bundle);
                }
            }
        }

        let list: Vec<BundleInfo> = closure
            .into_iter()
            .filter(|b| self.fetch_eligible(b))
            .map(|b| self.remote(b))
            .collect();
        debug!(
            "download list (paths): {} bundles for {} assets",
            list.len(),
            assets.len()
        );
        Ok(list)
    }

    /// Every build-in bundle not yet in the cache
    pub fn unpack_by_all(&self) -> Vec<BundleInfo> {
        self.manifest
            .bundles()
            .iter()
            .filter(|b| self.unpack_eligible(b))
            .map(|b| self.local(b))
            .collect()
    }

    /// Build-in bundles to unpack for `tags`.
    ///
    /// Unlike download lists, a bundle must carry one of `tags`; untagged
    /// build-in bundles belong to `unpack_by_all` only.
    pub fn unpack_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<BundleInfo> {
        self.manifest
            .bundles()
            .iter()
            .filter(|b| b.has_tag(tags) && self.unpack_eligible(b))
            .map(|b| self.local(b))
            .collect()
    }
}

fn tag_selected<S: AsRef<str>>(bundle: &BundleDescriptor, tags: &[S]) -> bool {
    !bundle.has_any_tags() || bundle.has_tag(tags)
}
