//! Filesystem package lookup tests

use polytarget_package::{BrowserField, FsPackageLookup, PackageLookup};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create a directory tree with the given files
fn create_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (file_path, content) in files {
        let full_path = dir.path().join(file_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full_path, content).unwrap();
    }
    dir
}

#[test]
fn test_nearest_manifest_owns_file() {
    let tree = create_tree(&[
        ("package.json", r#"{ "name": "app", "main": "src/index.js" }"#),
        ("src/index.js", ""),
        (
            "node_modules/dep/package.json",
            r#"{ "name": "dep", "main": "dist/dep.js" }"#,
        ),
        ("node_modules/dep/dist/dep.js", ""),
    ]);
    let lookup = FsPackageLookup::new();

    let owner = lookup
        .lookup(&tree.path().join("node_modules/dep/dist/dep.js"))
        .unwrap();
    assert_eq!(owner.manifest.name.as_deref(), Some("dep"));
    assert!(owner.is_prebuilt_entry(&tree.path().join("node_modules/dep/dist/dep.js")));

    let owner = lookup.lookup(&tree.path().join("src/index.js")).unwrap();
    assert_eq!(owner.manifest.name.as_deref(), Some("app"));
}

#[test]
fn test_results_are_cached_per_directory() {
    let tree = create_tree(&[
        ("package.json", r#"{ "name": "app" }"#),
        ("src/a.js", ""),
    ]);
    let lookup = FsPackageLookup::new();
    let file = tree.path().join("src/a.js");

    let first = lookup.lookup(&file).unwrap();
    fs::write(tree.path().join("package.json"), r#"{ "name": "renamed" }"#).unwrap();
    let second = lookup.lookup(&file).unwrap();
    assert_eq!(second.manifest.name.as_deref(), Some("app"));
    assert_eq!(first, second);

    lookup.clear();
    let third = lookup.lookup(&file).unwrap();
    assert_eq!(third.manifest.name.as_deref(), Some("renamed"));
}

#[rstest]
#[case(r#"{ "browser": "./browser.js" }"#, Some(BrowserField::Entry("./browser.js".to_string())))]
#[case(r#"{ "browser": true }"#, None)]
#[case(r#"{ "browser": null }"#, None)]
fn test_browser_field_forms(#[case] json: &str, #[case] expected: Option<BrowserField>) {
    let tree = create_tree(&[("package.json", json), ("x.js", "")]);
    let owner = FsPackageLookup::new()
        .lookup(&tree.path().join("x.js"))
        .unwrap();
    assert_eq!(owner.manifest.browser, expected);
}

#[test]
fn test_malformed_manifest_yields_no_owner() {
    let tree = create_tree(&[("package.json", "{ broken"), ("x.js", "")]);
    let owner = FsPackageLookup::new().lookup(&tree.path().join("x.js"));
    assert!(owner.is_none());
}

#[test]
fn test_file_without_parent() {
    assert!(FsPackageLookup::new().lookup(Path::new("")).is_none());
}
