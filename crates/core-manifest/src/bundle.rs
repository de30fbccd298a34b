//! Bundle descriptors and asset references
//!
//! A bundle descriptor is read-only once the manifest is loaded. Everything a
//! session decides about a bundle (cached, build-in, remote) lives outside this
//! crate.

use serde::{Deserialize, Serialize};

/// A named, content-addressed unit of packaged assets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleDescriptor {
    /// Bundle identity (unique within a manifest)
    pub name: String,

    /// File name on hosts and in the cache (defaults to `name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Content hash (lowercase hex)
    pub hash: String,

    /// Size in bytes
    pub size: u64,

    /// Classification labels; an empty set means "always required"
    #[serde(default)]
    pub tags: Vec<String>,

    /// Names of the bundles this bundle directly depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl BundleDescriptor {
    /// Create an untagged descriptor with no dependencies
    pub fn new(name: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            hash: hash.into(),
            size,
            tags: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Set an explicit file name
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Replace the tag set
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the direct dependency list
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// File name used for URLs and cache entries
    pub fn file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the bundle carries at least one tag
    pub fn has_any_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Whether the bundle's tag set intersects `tags`
    pub fn has_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter()
            .any(|wanted| self.tags.iter().any(|own| own == wanted.as_ref()))
    }
}

/// Maps an asset path to the bundle that owns it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetEntry {
    /// Asset path as the loader requests it
    pub path: String,

    /// Owning bundle name
    pub bundle: String,
}

impl AssetEntry {
    pub fn new(path: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            bundle: bundle.into(),
        }
    }
}

/// A caller-side reference to an asset.
///
/// Producers mark a reference invalid (with a reason) when they already know it
/// cannot be resolved; consumers skip invalid references instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Requested asset path
    pub path: String,

    /// Why this reference is invalid, if it is
    pub error: Option<String>,
}

impl AssetInfo {
    /// A reference the producer believes to be resolvable
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: None,
        }
    }

    /// A reference already known to be unresolvable
    pub fn invalid(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.error.is_some()
    }
}
