//! Core manifest data structures for Patchbay
//!
//! The manifest is the authoritative catalog of every bundle a package ships:
//! content hash, size, tags and direct dependencies, plus the mapping from
//! asset paths to the bundle that owns them.
//!
//! # Key Concepts
//!
//! - **Bundle Descriptor**: immutable, content-addressed unit of packaged assets
//! - **Asset Entry**: maps an asset path to its owning bundle
//! - **Dependency Closure**: every bundle an asset transitively needs
//!
//! # Example
//!
//! ```
//! use patchbay_core_manifest::{AssetEntry, BundleDescriptor, Manifest};
//!
//! let manifest = Manifest::new(
//!     "game",
//!     "1.0.0",
//!     vec![
//!         BundleDescriptor::new("ui", "aa11", 128).with_dependencies(["fonts"]),
//!         BundleDescriptor::new("fonts", "bb22", 64),
//!     ],
//!     vec![AssetEntry::new("ui/main.prefab", "ui")],
//! )
//! .unwrap();
//!
//! let deps = manifest.all_dependencies("ui/main.prefab").unwrap();
//! assert_eq!(deps[0].name, "fonts");
//! ```

pub mod bundle;
pub mod error;
pub mod manifest;
pub mod validate;

// Re-export main types for convenience
pub use bundle::{AssetEntry, AssetInfo, BundleDescriptor};
pub use error::{Error, Result};
pub use manifest::Manifest;
pub use validate::validate_manifest;

/// Schema version for bundle manifests
pub const MANIFEST_SCHEMA_VERSION: &str = "patchbay.manifest.v1";
