//! sync::rewrite
//!
//! Tree rewriter: retargets one gitlink entry in the aggregator tree.
//!
//! # Merkle locality
//!
//! The rewrite is a structured read-modify-write over discrete tree entries.
//! At every level on the path to the gitlink, exactly one entry changes its
//! target; names, modes, order and the targets of all other entries are
//! carried over untouched, so unrelated subtrees keep their hashes.
//!
//! Nothing is written here. The [`TreeRewrite`] holds the listings needed by
//! the commit builder, which writes them leaf to root.

use tracing::debug;

use super::error::SyncError;
use crate::core::types::{GitlinkPath, Oid};
use crate::git::{EntryKind, Git, TreeSnapshot};

/// Replace the target of the gitlink called `name` in one listing.
///
/// Returns the new listing and the previously pinned revision, or `None`
/// if `snapshot` has no gitlink called `name`.
pub fn replace_gitlink(
    snapshot: &TreeSnapshot,
    name: &str,
    new: &Oid,
) -> Option<(TreeSnapshot, Oid)> {
    let index = snapshot.position(name)?;
    let entry = &snapshot.entries()[index];
    if !entry.is_gitlink() {
        return None;
    }
    let previous = entry.oid.clone();
    Some((snapshot.with_target(index, new.clone()), previous))
}

/// One ancestor listing on the path from the root to the gitlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorLevel {
    /// The listing as read
    pub snapshot: TreeSnapshot,
    /// Index of the entry leading towards the gitlink
    pub child: usize,
}

/// A computed rewrite of the aggregator tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRewrite {
    path: GitlinkPath,
    previous: Oid,
    replacement: Oid,
    /// Root first; empty when the gitlink sits in the root tree.
    ancestors: Vec<AncestorLevel>,
    /// The listing containing the gitlink, already retargeted.
    leaf: TreeSnapshot,
}

impl TreeRewrite {
    /// The gitlink path being rewritten.
    pub fn path(&self) -> &GitlinkPath {
        &self.path
    }

    /// The revision pinned before the rewrite.
    pub fn previous(&self) -> &Oid {
        &self.previous
    }

    /// The revision pinned after the rewrite.
    pub fn replacement(&self) -> &Oid {
        &self.replacement
    }

    /// Whether the gitlink already pins the requested revision.
    pub fn is_noop(&self) -> bool {
        self.previous == self.replacement
    }

    /// Ancestor listings, root first.
    pub fn ancestors(&self) -> &[AncestorLevel] {
        &self.ancestors
    }

    /// The retargeted listing that contains the gitlink.
    pub fn leaf(&self) -> &TreeSnapshot {
        &self.leaf
    }
}

/// Computes rewrites against an aggregator repository.
pub struct TreeRewriter<'a> {
    git: &'a Git,
}

impl<'a> TreeRewriter<'a> {
    /// Create a rewriter over `git`.
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Compute the rewrite of `path` to `new` in the tree of commit `tip`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] if a component of `path` is missing, an
    ///   intermediate component is not a directory, or the final component
    ///   is not a gitlink. Entries are never created.
    /// - [`SyncError::Component`] if the object store cannot be read
    pub fn rewrite(
        &self,
        tip: &Oid,
        path: &GitlinkPath,
        new: &Oid,
    ) -> Result<TreeRewrite, SyncError> {
        let not_found = |detail: String| SyncError::NotFound {
            path: path.clone(),
            commit: tip.clone(),
            detail,
        };

        let mut tree = self.git.commit_tree(tip)?;
        let mut ancestors = Vec::new();
        let mut walked = String::new();

        let components: Vec<&str> = path.components().collect();
        let (leaf_name, dirs) = match components.split_last() {
            Some(split) => split,
            None => return Err(not_found("empty path".to_string())),
        };

        for dir in dirs {
            let snapshot = self.git.read_tree(&tree)?;
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(dir);

            let child = snapshot
                .position(dir)
                .ok_or_else(|| not_found(format!("'{}' does not exist", walked)))?;
            let entry = &snapshot.entries()[child];
            if entry.kind() != EntryKind::Tree {
                return Err(not_found(format!(
                    "'{}' is a {}, not a directory",
                    walked,
                    entry.kind()
                )));
            }

            tree = entry.oid.clone();
            ancestors.push(AncestorLevel { snapshot, child });
        }

        let listing = self.git.read_tree(&tree)?;
        let (leaf, previous) = match replace_gitlink(&listing, leaf_name, new) {
            Some(found) => found,
            None => {
                let detail = match listing.get(leaf_name) {
                    Some(entry) => format!("'{}' is a {}, not a gitlink", path, entry.kind()),
                    None => format!("'{}' does not exist", path),
                };
                return Err(not_found(detail));
            }
        };

        debug!(
            path = %path,
            previous = %previous.short(12),
            new = %new.short(12),
            depth = ancestors.len(),
            "computed tree rewrite"
        );

        Ok(TreeRewrite {
            path: path.clone(),
            previous,
            replacement: new.clone(),
            ancestors,
            leaf,
        })
    }
}
