/*!
 * Resolved, per-session view of a manifest bundle
 */

use patchbay_core_manifest::BundleDescriptor;
use std::fmt;
use std::path::Path;

/// Where a bundle is loaded from in this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Already present in the local cache
    FromCache,
    /// Shipped with the client install
    FromBuildIn,
    /// Must be downloaded from a host
    FromRemote,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::FromCache => write!(f, "cache"),
            LoadMode::FromBuildIn => write!(f, "build-in"),
            LoadMode::FromRemote => write!(f, "remote"),
        }
    }
}

/// A bundle descriptor classified for one session.
///
/// The load mode is fixed at construction from a snapshot of the cache and
/// build-in state. URLs are only meaningful for `FromRemote` and for unpack
/// work, where both point at the build-in file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub descriptor: BundleDescriptor,
    pub load_mode: LoadMode,
    pub main_url: String,
    pub fallback_url: String,
}

impl BundleInfo {
    /// A bundle to fetch from `{host}/{file_name}`
    pub fn remote(descriptor: BundleDescriptor, host: &str, fallback_host: &str) -> Self {
        let main_url = join_url(host, descriptor.file_name());
        let fallback_url = join_url(fallback_host, descriptor.file_name());
        Self {
            descriptor,
            load_mode: LoadMode::FromRemote,
            main_url,
            fallback_url,
        }
    }

    /// A build-in bundle; both URLs are the local file under `buildin_root`
    pub fn buildin(descriptor: BundleDescriptor, buildin_root: &Path) -> Self {
        let local = buildin_root
            .join(descriptor.file_name())
            .to_string_lossy()
            .into_owned();
        Self {
            descriptor,
            load_mode: LoadMode::FromBuildIn,
            main_url: local.clone(),
            fallback_url: local,
        }
    }

    /// A bundle already in the cache
    pub fn cached(descriptor: BundleDescriptor) -> Self {
        Self {
            descriptor,
            load_mode: LoadMode::FromCache,
            main_url: String::new(),
            fallback_url: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size
    }
}

/// `{host}/{file_name}`, exactly; the host is used as given
pub fn join_url(host: &str, file_name: &str) -> String {
    format!("{}/{}", host, file_name)
}
