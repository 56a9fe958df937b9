//! Property-based tests for tree rewriting and domain types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated trees and identifiers.

use std::path::Path;
use std::process::Command;

use proptest::prelude::*;
use tempfile::TempDir;

use gitlink_sync::core::types::{GitlinkPath, Oid, RepoId};
use gitlink_sync::git::{Git, TreeEntry, TreeSnapshot, GITLINK_MODE, TREE_MODE};
use gitlink_sync::sync::rewrite::replace_gitlink;

/// Strategy for object ids.
fn oid() -> impl Strategy<Value = Oid> {
    "[0-9a-f]{40}".prop_map(|hex| Oid::new(hex).unwrap())
}

/// Strategy for filemodes found in real trees.
fn mode() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(0o100644u32),
        Just(0o100755u32),
        Just(0o120000u32),
        Just(TREE_MODE),
        Just(GITLINK_MODE),
    ]
}

/// Strategy for a tree listing with at least one gitlink, plus the index of
/// a gitlink in it.
fn tree_with_gitlink() -> impl Strategy<Value = (TreeSnapshot, usize)> {
    prop::collection::btree_set("[a-z][a-z0-9._-]{0,12}", 1..16)
        .prop_flat_map(|names| {
            let n = names.len();
            (
                Just(names),
                prop::collection::vec(mode(), n),
                prop::collection::vec(oid(), n),
                0..n,
            )
        })
        .prop_map(|(names, mut modes, oids, target)| {
            modes[target] = GITLINK_MODE;
            let entries = names
                .into_iter()
                .zip(modes)
                .zip(oids)
                .map(|((name, mode), oid)| TreeEntry::new(name, mode, oid))
                .collect();
            (TreeSnapshot::from_entries(entries), target)
        })
}

fn scratch_repo() -> (TempDir, Git) {
    let dir = TempDir::new().unwrap();
    let status = Command::new("git")
        .args(["init", "-q", "--bare"])
        .current_dir(dir.path())
        .status()
        .expect("failed to run git");
    assert!(status.success());
    let git = Git::open(dir.path()).unwrap();
    (dir, git)
}

proptest! {
    #[test]
    fn rewrite_changes_only_the_target((tree, target) in tree_with_gitlink(), new in oid()) {
        let name = tree.entries()[target].display_name();
        let (rewritten, previous) = replace_gitlink(&tree, &name, &new).unwrap();

        prop_assert_eq!(&previous, &tree.entries()[target].oid);
        prop_assert_eq!(rewritten.len(), tree.len());
        for (i, (before, after)) in tree.entries().iter().zip(rewritten.entries()).enumerate() {
            prop_assert_eq!(&before.name, &after.name);
            prop_assert_eq!(before.mode, after.mode);
            if i == target {
                prop_assert_eq!(&after.oid, &new);
            } else {
                prop_assert_eq!(&after.oid, &before.oid);
            }
        }
    }

    #[test]
    fn rewrite_is_idempotent((tree, target) in tree_with_gitlink(), new in oid()) {
        let name = tree.entries()[target].display_name();
        let (once, _) = replace_gitlink(&tree, &name, &new).unwrap();
        let (twice, previous) = replace_gitlink(&once, &name, &new).unwrap();

        prop_assert_eq!(&previous, &new);
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn only_gitlinks_are_retargeted((tree, _) in tree_with_gitlink(), new in oid()) {
        for entry in tree.entries() {
            let result = replace_gitlink(&tree, &entry.display_name(), &new);
            prop_assert_eq!(result.is_some(), entry.is_gitlink());
        }
        prop_assert!(replace_gitlink(&tree, "no such entry!", &new).is_none());
    }

    #[test]
    fn valid_paths_round_trip(components in prop::collection::vec("[a-z0-9][a-z0-9_-]{0,8}", 1..5)) {
        let joined = components.join("/");
        let path = GitlinkPath::new(joined.clone()).unwrap();
        prop_assert_eq!(path.as_str(), joined.as_str());
        prop_assert_eq!(path.components().collect::<Vec<_>>(), components.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(path.file_name(), components.last().unwrap().as_str());
    }

    #[test]
    fn traversal_paths_rejected(
        prefix in prop::collection::vec("[a-z]{1,5}", 0..3),
        bad in prop_oneof![Just(".."), Just("."), Just("")],
    ) {
        let mut components = prefix;
        components.push(bad.to_string());
        components.push("leaf".to_string());
        prop_assert!(GitlinkPath::new(components.join("/")).is_err());
    }

    #[test]
    fn repo_id_ignores_git_suffix(name in "[a-z][a-z0-9_-]{0,15}") {
        let bare = format!("/srv/git/{}.git", name);
        let work = format!("/home/dev/{}/.git", name);
        let id_bare = RepoId::from_repo_path(Path::new(&bare)).unwrap();
        prop_assert_eq!(id_bare.as_str(), name.as_str());
        let id_work = RepoId::from_repo_path(Path::new(&work)).unwrap();
        prop_assert_eq!(id_work.as_str(), name.as_str());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Written trees keep every sibling's bytes and are reproducible.
    #[test]
    fn written_trees_have_merkle_locality((tree, target) in tree_with_gitlink(), new in oid()) {
        let (_dir, git) = scratch_repo();
        let name = tree.entries()[target].display_name();
        let (rewritten, _) = replace_gitlink(&tree, &name, &new).unwrap();

        let original = git.write_tree(&tree).unwrap();
        let first = git.write_tree(&rewritten).unwrap();
        let second = git.write_tree(&rewritten).unwrap();
        prop_assert_eq!(&first, &second);

        let read_back = git.read_tree(&first).unwrap();
        prop_assert_eq!(&read_back, &rewritten);
        prop_assert_eq!(&git.read_tree(&original).unwrap(), &tree);
    }
}
