//! Integration tests for workspace indexing.
//!
//! These cover the one-shot index build over realistic trees: grouping by
//! extension, exclusion of version-control and build directories, and the
//! determinism repeated queries rely on.
//!
//! Run with: `cargo test -p magpie --test workspace_scan`

mod common;

use std::fs;
use std::path::Path;

use common::{create_fixture_workspace, write_fixture_workspace, FixtureConfig};
use magpie::workspace_index::WorkspaceIndex;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

#[test]
fn indexes_every_generated_file() {
    let config = FixtureConfig::medium();
    let workspace = create_fixture_workspace(&config);

    let index = WorkspaceIndex::build(workspace.path()).unwrap();
    assert_eq!(index.files_for("py").len(), config.file_count);
    assert_eq!(index.total_files(), config.file_count);
}

#[test]
fn groups_mixed_languages_by_extension() {
    let workspace = create_fixture_workspace(&FixtureConfig::small());
    write(workspace.path(), "server/main.go", "package main\n");
    write(workspace.path(), "lib/util.rs", "fn util() {}\n");
    write(workspace.path(), "web/app.ts", "function app() {}\n");
    write(workspace.path(), "README.md", "docs, not code\n");

    let index = WorkspaceIndex::build(workspace.path()).unwrap();
    let groups: Vec<_> = index.groups().map(|(ext, files)| (ext.to_string(), files.len())).collect();
    assert_eq!(
        groups,
        vec![
            ("go".to_string(), 1),
            ("py".to_string(), 5),
            ("rs".to_string(), 1),
            ("ts".to_string(), 1),
        ]
    );
}

#[test]
fn vcs_and_build_directories_never_contribute_files() {
    let workspace = create_fixture_workspace(&FixtureConfig::small());
    write(workspace.path(), ".git/objects/pack.py", "x = 1\n");
    write(workspace.path(), "vendor/node_modules/dep/index.js", "x\n");
    write(workspace.path(), "deep/target/release/gen.rs", "fn x() {}\n");
    write(workspace.path(), "src/__pycache__/cached.py", "x = 1\n");
    write(workspace.path(), "src/fine.py", "x = 1\n");

    let index = WorkspaceIndex::build(workspace.path()).unwrap();
    assert_eq!(index.files_for("py").len(), 6, "5 fixtures + src/fine.py");
    assert!(index.files_for("js").is_empty());
    assert!(index.files_for("rs").is_empty());
    for file in index.files_for("py") {
        let path = file.display().to_string();
        assert!(!path.contains(".git"), "{}", path);
        assert!(!path.contains("__pycache__"), "{}", path);
    }
}

#[test]
fn repeated_builds_see_the_same_workspace() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_workspace(dir.path(), &FixtureConfig::small());

    let first = WorkspaceIndex::build(dir.path()).unwrap();
    let second = WorkspaceIndex::build(dir.path()).unwrap();

    assert_eq!(first.total_files(), second.total_files());
    assert_eq!(first.files_for("py"), second.files_for("py"));
}

#[test]
fn files_within_a_group_keep_walk_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["zeta.py", "alpha.py", "midway.py"] {
        write(dir.path(), name, "x = 1\n");
    }
    let index = WorkspaceIndex::build(dir.path()).unwrap();
    let names: Vec<_> = index
        .files_for("py")
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["alpha.py", "midway.py", "zeta.py"]);
}

#[test]
fn unreadable_root_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-created");
    assert!(WorkspaceIndex::build(&missing).is_err());
}
