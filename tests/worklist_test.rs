use patchbay::{
    AssetEntry, AssetInfo, BundleDescriptor, BundleInfo, LoadMode, Manifest, PatchError,
    WorkListBuilder,
};
use std::path::Path;

fn never(_: &BundleDescriptor) -> bool {
    false
}

fn names(list: &[BundleInfo]) -> Vec<&str> {
    list.iter().map(BundleInfo::name).collect()
}

fn tagged_manifest() -> Manifest {
    Manifest::new(
        "game",
        "1.0.0",
        vec![
            BundleDescriptor::new("a", "a0", 10),
            BundleDescriptor::new("b", "b0", 20).with_tags(["dlc"]),
            BundleDescriptor::new("c", "c0", 30),
        ],
        vec![],
    )
    .unwrap()
}

#[test]
fn test_tag_filter_keeps_untagged_bundles() {
    let manifest = tagged_manifest();
    let builder = WorkListBuilder::new(&manifest, &never, &never);

    assert_eq!(names(&builder.by_all()), vec!["a", "b", "c"]);
    assert_eq!(names(&builder.by_tags(&["dlc"])), vec!["a", "b", "c"]);
    assert_eq!(names(&builder.by_tags(&["other"])), vec!["a", "c"]);
}

#[test]
fn test_empty_tag_set_selects_only_untagged() {
    let manifest = tagged_manifest();
    let builder = WorkListBuilder::new(&manifest, &never, &never);
    let none: [&str; 0] = [];

    assert_eq!(names(&builder.by_tags(&none)), vec!["a", "c"]);
}

fn chained_manifest() -> Manifest {
    // prefab lives in "main", which needs "b", which needs "c"
    Manifest::new(
        "game",
        "1.0.0",
        vec![
            BundleDescriptor::new("main", "01", 5).with_dependencies(["b"]),
            BundleDescriptor::new("b", "02", 6).with_dependencies(["c"]),
            BundleDescriptor::new("c", "03", 7),
            BundleDescriptor::new("other", "04", 8).with_dependencies(["c"]),
        ],
        vec![
            AssetEntry::new("scenes/level.prefab", "main"),
            AssetEntry::new("scenes/other.prefab", "other"),
        ],
    )
    .unwrap()
}

#[test]
fn test_paths_exclude_cached_dependencies() {
    let manifest = chained_manifest();
    let cached = |b: &BundleDescriptor| b.name == "b";
    let builder = WorkListBuilder::new(&manifest, &cached, &never);

    let list = builder
        .by_paths(&[AssetInfo::new("scenes/level.prefab")])
        .unwrap();
    assert_eq!(names(&list), vec!["main", "c"]);
}

#[test]
fn test_paths_deduplicate_shared_dependencies() {
    let manifest = chained_manifest();
    let builder = WorkListBuilder::new(&manifest, &never, &never);

    let list = builder
        .by_paths(&[
            AssetInfo::new("scenes/level.prefab"),
            AssetInfo::new("scenes/other.prefab"),
        ])
        .unwrap();
    assert_eq!(names(&list), vec!["main", "b", "c", "other"]);
}

#[test]
fn test_paths_skip_invalid_assets() {
    let manifest = chained_manifest();
    let builder = WorkListBuilder::new(&manifest, &never, &never);

    let list = builder
        .by_paths(&[
            AssetInfo::invalid("missing.prefab", "not in any bundle"),
            AssetInfo::new("scenes/other.prefab"),
        ])
        .unwrap();
    assert_eq!(names(&list), vec!["other", "c"]);
}

#[test]
fn test_paths_unknown_asset_is_fatal() {
    let manifest = chained_manifest();
    let builder = WorkListBuilder::new(&manifest, &never, &never);

    let err = builder
        .by_paths(&[AssetInfo::new("nowhere.prefab")])
        .unwrap_err();
    assert!(matches!(err, PatchError::Manifest(_)));
    assert_eq!(err.exit_code(), patchbay::error::EXIT_FATAL);
}

#[test]
fn test_buildin_bundles_are_unpacked_not_downloaded() {
    let manifest = tagged_manifest();
    let cached = |b: &BundleDescriptor| b.name == "a";
    let buildin = |b: &BundleDescriptor| b.name != "c";
    let root = Path::new("/opt/game/buildin");
    let builder = WorkListBuilder::new(&manifest, &cached, &buildin)
        .with_hosts("http://cdn", "http://mirror")
        .with_buildin_root(root);

    let download = builder.by_all();
    assert_eq!(names(&download), vec!["c"]);
    assert_eq!(download[0].load_mode, LoadMode::FromRemote);
    assert_eq!(download[0].main_url, "http://cdn/c");
    assert_eq!(download[0].fallback_url, "http://mirror/c");

    let unpack = builder.unpack_by_all();
    assert_eq!(names(&unpack), vec!["b"]);
    assert_eq!(unpack[0].load_mode, LoadMode::FromBuildIn);
    assert!(unpack[0].main_url.ends_with("b"));

    assert!(builder.unpack_by_tags(&["other"]).is_empty());
    assert_eq!(names(&builder.unpack_by_tags(&["dlc"])), vec!["b"]);
}

#[test]
fn test_unpack_tags_require_a_matching_tag() {
    let manifest = Manifest::new(
        "game",
        "1.0.0",
        vec![
            BundleDescriptor::new("base", "e0", 10),
            BundleDescriptor::new("dlc", "e1", 20).with_tags(["dlc"]),
        ],
        vec![],
    )
    .unwrap();
    let everything = |_: &BundleDescriptor| true;
    let builder = WorkListBuilder::new(&manifest, &never, &everything);

    assert_eq!(names(&builder.unpack_by_tags(&["dlc"])), vec!["dlc"]);
    assert_eq!(names(&builder.unpack_by_all()), vec!["base", "dlc"]);
    // Downloads keep the untagged bundle; nothing is downloadable here though
    assert!(builder.by_tags(&["dlc"]).is_empty());
}
