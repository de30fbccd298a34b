/*!
 * Cache and build-in lookups consulted by the work-list builder
 *
 * Both are read-only snapshots from the builder's point of view. Any
 * `Fn(&BundleDescriptor) -> bool` closure implements the traits, which keeps
 * tests free of filesystem setup.
 */

use patchbay_core_manifest::BundleDescriptor;
use std::path::{Path, PathBuf};

/// Is this bundle already in the local cache?
pub trait CacheQuery: Send + Sync {
    fn is_cached(&self, bundle: &BundleDescriptor) -> bool;
}

/// Is this bundle shipped with the client install?
pub trait BuildinQuery: Send + Sync {
    fn is_buildin(&self, bundle: &BundleDescriptor) -> bool;
}

impl<F> CacheQuery for F
where
    F: Fn(&BundleDescriptor) -> bool + Send + Sync,
{
    fn is_cached(&self, bundle: &BundleDescriptor) -> bool {
        self(bundle)
    }
}

impl<F> BuildinQuery for F
where
    F: Fn(&BundleDescriptor) -> bool + Send + Sync,
{
    fn is_buildin(&self, bundle: &BundleDescriptor) -> bool {
        self(bundle)
    }
}

/// Cache directory holding bundles by file name.
///
/// A bundle counts as cached when its file exists with the manifest size;
/// a truncated leftover is treated as missing.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `bundle` lives (or would live) in the cache
    pub fn path_of(&self, bundle: &BundleDescriptor) -> PathBuf {
        self.root.join(bundle.file_name())
    }
}

impl CacheQuery for FsCache {
    fn is_cached(&self, bundle: &BundleDescriptor) -> bool {
        match std::fs::metadata(self.path_of(bundle)) {
            Ok(meta) => meta.is_file() && meta.len() == bundle.size,
            Err(_) => false,
        }
    }
}

/// Build-in directory shipped with the client
#[derive(Debug, Clone)]
pub struct FsBuildin {
    root: PathBuf,
}

impl FsBuildin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BuildinQuery for FsBuildin {
    fn is_buildin(&self, bundle: &BundleDescriptor) -> bool {
        self.root.join(bundle.file_name()).is_file()
    }
}
