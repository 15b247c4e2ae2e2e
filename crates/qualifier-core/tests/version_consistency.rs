//! Ensures all workspace crates inherit the workspace version and that the
//! exported `VERSION` matches it.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .to_path_buf()
}

fn manifest(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    raw.parse().unwrap()
}

#[test]
fn all_crates_use_workspace_version() {
    let root = workspace_root();
    for krate in ["crates/qualifier-domain", "crates/qualifier-core"] {
        let doc = manifest(&root.join(krate));
        let inherited = doc
            .get("package")
            .and_then(|pkg| pkg.get("version"))
            .and_then(|version| version.get("workspace"))
            .and_then(toml::Value::as_bool);
        assert_eq!(
            inherited,
            Some(true),
            "{krate} should use version.workspace = true"
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));
    assert_eq!(ws_version, qualifier_core::VERSION);
}

#[test]
fn internal_dependency_versions_match_workspace() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    for krate in ["qualifier-domain", "qualifier-core"] {
        let declared = doc["workspace"]["dependencies"][krate]["version"]
            .as_str()
            .unwrap();
        assert_eq!(declared, ws_version, "{krate} dependency version drifted");
    }
}

#[test]
fn dev_dependencies_do_not_redeclare_normal_dependencies() {
    let root = workspace_root();
    for krate in ["crates/qualifier-domain", "crates/qualifier-core"] {
        let doc = manifest(&root.join(krate));
        let (Some(normal), Some(dev)) = (
            doc.get("dependencies").and_then(toml::Value::as_table),
            doc.get("dev-dependencies").and_then(toml::Value::as_table),
        ) else {
            continue;
        };
        for name in dev.keys() {
            assert!(
                !normal.contains_key(name),
                "{krate} lists {name} under both dependencies and dev-dependencies"
            );
        }
    }
}
