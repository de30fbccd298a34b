//! Manifest catalog and lookup index
//!
//! A [`Manifest`] is read-only once built. The bundle list keeps the order the
//! producer wrote it in; every work list derived from it preserves that order.

use crate::bundle::{AssetEntry, AssetInfo, BundleDescriptor};
use crate::error::{Error, Result};
use crate::validate::validate_manifest;
use crate::MANIFEST_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

/// The authoritative catalog of bundles and asset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version identifier
    pub schema: String,

    /// Package the manifest belongs to
    pub package_name: String,

    /// Producer-assigned package version
    pub package_version: String,

    /// Every bundle in the package, in producer order
    pub bundles: Vec<BundleDescriptor>,

    /// Asset path to owning bundle mapping
    #[serde(default)]
    pub assets: Vec<AssetEntry>,

    #[serde(skip)]
    index: ManifestIndex,
}

#[derive(Debug, Clone, Default)]
struct ManifestIndex {
    /// Bundle name -> position in `bundles`
    bundles: HashMap<String, usize>,
    /// Asset path (possibly lowered) -> position in `bundles`
    assets: HashMap<String, usize>,
    location_to_lower: bool,
}

impl Manifest {
    /// Build and validate a manifest from its parts
    pub fn new(
        package_name: impl Into<String>,
        package_version: impl Into<String>,
        bundles: Vec<BundleDescriptor>,
        assets: Vec<AssetEntry>,
    ) -> Result<Self> {
        let mut manifest = Self {
            schema: MANIFEST_SCHEMA_VERSION.to_string(),
            package_name: package_name.into(),
            package_version: package_version.into(),
            bundles,
            assets,
            index: ManifestIndex::default(),
        };
        manifest.finish()?;
        Ok(manifest)
    }

    /// Parse, validate and index a JSON manifest
    pub fn from_json(json: &str) -> Result<Self> {
        let mut manifest: Manifest = serde_json::from_str(json)?;
        manifest.finish()?;
        Ok(manifest)
    }

    /// Load a JSON manifest from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::manifest_not_found(path));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Re-index with case-insensitive asset path lookups
    pub fn with_location_to_lower(mut self, enabled: bool) -> Self {
        if self.index.location_to_lower != enabled {
            self.index = build_index(&self.bundles, &self.assets, enabled);
        }
        self
    }

    fn finish(&mut self) -> Result<()> {
        validate_manifest(self)?;
        self.index = build_index(&self.bundles, &self.assets, false);
        Ok(())
    }

    /// Every bundle in manifest order
    pub fn bundles(&self) -> &[BundleDescriptor] {
        &self.bundles
    }

    /// Look up a bundle by name
    pub fn bundle(&self, name: &str) -> Option<&BundleDescriptor> {
        self.index.bundles.get(name).map(|&i| &self.bundles[i])
    }

    /// Whether the manifest maps `asset_path` to a bundle
    pub fn contains_asset(&self, asset_path: &str) -> bool {
        self.index.assets.contains_key(self.location_key(asset_path).as_str())
    }

    /// Producer-side asset reference; unknown paths come back marked invalid
    pub fn asset_info(&self, asset_path: &str) -> AssetInfo {
        if self.contains_asset(asset_path) {
            AssetInfo::new(asset_path)
        } else {
            AssetInfo::invalid(
                asset_path,
                format!(
                    "asset '{}' is not listed in package '{}'",
                    asset_path, self.package_name
                ),
            )
        }
    }

    /// The bundle that owns `asset_path`
    pub fn main_bundle(&self, asset_path: &str) -> Result<&BundleDescriptor> {
        self.index
            .assets
            .get(self.location_key(asset_path).as_str())
            .map(|&i| &self.bundles[i])
            .ok_or_else(|| Error::unknown_asset(asset_path))
    }

    /// Transitive dependency closure of the bundle owning `asset_path`.
    ///
    /// Breadth-first, de-duplicated by bundle name, and never includes the
    /// owning bundle itself (even when a cycle leads back to it).
    pub fn all_dependencies(&self, asset_path: &str) -> Result<Vec<&BundleDescriptor>> {
        let main = self.main_bundle(asset_path)?;
        self.bundle_dependencies(&main.name)
    }

    /// Transitive dependency closure of a bundle, excluding the bundle itself
    pub fn bundle_dependencies(&self, bundle_name: &str) -> Result<Vec<&BundleDescriptor>> {
        let root = self
            .bundle(bundle_name)
            .ok_or_else(|| Error::unknown_bundle(bundle_name))?;

        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(root.name.as_str());

        let mut queue: VecDeque<&BundleDescriptor> = VecDeque::new();
        queue.push_back(root);

        let mut closure = Vec::new();
        while let Some(bundle) = queue.pop_front() {
            for dep_name in &bundle.dependencies {
                if !seen.insert(dep_name.as_str()) {
                    continue;
                }
                let dep = self
                    .bundle(dep_name)
                    .ok_or_else(|| Error::unknown_bundle(dep_name.as_str()))?;
                closure.push(dep);
                queue.push_back(dep);
            }
        }

        Ok(closure)
    }

    fn location_key(&self, asset_path: &str) -> String {
        if self.index.location_to_lower {
            asset_path.to_lowercase()
        } else {
            asset_path.to_string()
        }
    }
}

fn build_index(
    bundles: &[BundleDescriptor],
    assets: &[AssetEntry],
    location_to_lower: bool,
) -> ManifestIndex {
    let bundle_index: HashMap<String, usize> = bundles
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.clone(), i))
        .collect();

    let mut asset_index = HashMap::with_capacity(assets.len());
    for asset in assets {
        let Some(&position) = bundle_index.get(&asset.bundle) else {
            continue;
        };
        let key = if location_to_lower {
            asset.path.to_lowercase()
        } else {
            asset.path.clone()
        };
        asset_index.entry(key).or_insert(position);
    }

    ManifestIndex {
        bundles: bundle_index,
        assets: asset_index,
        location_to_lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Manifest {
        Manifest::new(
            "game",
            "2024.1",
            vec![
                BundleDescriptor::new("scene", "01", 100).with_dependencies(["shared", "ui"]),
                BundleDescriptor::new("ui", "02", 50).with_dependencies(["fonts"]),
                BundleDescriptor::new("shared", "03", 70).with_dependencies(["fonts"]),
                BundleDescriptor::new("fonts", "04", 20),
                BundleDescriptor::new("loose", "05", 5),
            ],
            vec![
                AssetEntry::new("Scenes/Main.unity", "scene"),
                AssetEntry::new("UI/Menu.prefab", "ui"),
                AssetEntry::new("Fonts/Body.ttf", "fonts"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_bundle_order_and_lookup() {
        let manifest = sample();
        let names: Vec<_> = manifest.bundles().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["scene", "ui", "shared", "fonts", "loose"]);
        assert_eq!(manifest.bundle("ui").unwrap().size, 50);
        assert!(manifest.bundle("missing").is_none());
    }

    #[test]
    fn test_main_bundle() {
        let manifest = sample();
        assert_eq!(manifest.main_bundle("UI/Menu.prefab").unwrap().name, "ui");

        let err = manifest.main_bundle("UI/Nope.prefab").unwrap_err();
        assert!(matches!(err, Error::UnknownAsset { .. }));
    }

    #[test]
    fn test_transitive_closure_dedups_shared_dependency() {
        let manifest = sample();
        let deps = manifest.all_dependencies("Scenes/Main.unity").unwrap();
        let names: Vec<_> = deps.iter().map(|b| b.name.as_str()).collect();
        // fonts is reachable through both ui and shared, listed once
        assert_eq!(names, ["shared", "ui", "fonts"]);
    }

    #[test]
    fn test_leaf_has_no_dependencies() {
        let manifest = sample();
        assert!(manifest.all_dependencies("Fonts/Body.ttf").unwrap().is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let manifest = Manifest::new(
            "cyclic",
            "1",
            vec![
                BundleDescriptor::new("a", "1", 1).with_dependencies(["b"]),
                BundleDescriptor::new("b", "2", 1).with_dependencies(["a"]),
            ],
            vec![AssetEntry::new("x", "a")],
        )
        .unwrap();

        let deps = manifest.all_dependencies("x").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "b");
    }

    #[test]
    fn test_location_to_lower() {
        let manifest = sample();
        assert!(!manifest.contains_asset("ui/menu.prefab"));

        let lowered = manifest.with_location_to_lower(true);
        assert!(lowered.contains_asset("ui/menu.prefab"));
        assert!(lowered.contains_asset("UI/MENU.PREFAB"));
        assert_eq!(lowered.main_bundle("ui/MENU.prefab").unwrap().name, "ui");
    }

    #[test]
    fn test_asset_info_marks_unknown_invalid() {
        let manifest = sample();
        assert!(!manifest.asset_info("UI/Menu.prefab").is_invalid());

        let info = manifest.asset_info("Missing.asset");
        assert!(info.is_invalid());
        assert!(info.error.unwrap().contains("Missing.asset"));
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let manifest = sample();
        let json = manifest.to_json().unwrap();
        let loaded = Manifest::from_json(&json).unwrap();
        assert_eq!(loaded.bundles(), manifest.bundles());
        assert_eq!(loaded.main_bundle("UI/Menu.prefab").unwrap().name, "ui");
    }

    #[test]
    fn test_file_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        sample().save(&path).unwrap();

        let loaded = Manifest::from_file(&path).unwrap();
        assert_eq!(loaded.package_version, "2024.1");

        let missing = Manifest::from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, Error::ManifestNotFound { .. }));
    }
}
