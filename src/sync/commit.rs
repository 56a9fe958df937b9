//! sync::commit
//!
//! Commit builder: materializes a [`TreeRewrite`] as tree objects and a
//! single-parent commit.
//!
//! Object creation is non-destructive. A commit built here is invisible
//! until the ref advancer publishes it; if that never happens the objects
//! are simply unreferenced.

use tracing::debug;

use super::error::SyncError;
use super::filter::SyncRequest;
use super::rewrite::TreeRewrite;
use crate::core::types::Oid;
use crate::git::{Git, Identity};

/// Length of abbreviated hashes in commit summaries.
const SHORT_HASH: usize = 12;

/// Objects written for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommit {
    /// The new root tree
    pub tree: Oid,
    /// The new commit
    pub commit: Oid,
}

/// The message recorded on a synchronization commit.
///
/// ```
/// use gitlink_sync::core::types::{BranchName, GitlinkPath, Oid, RepoId};
/// use gitlink_sync::sync::commit::sync_message;
/// use gitlink_sync::sync::filter::SyncRequest;
///
/// let request = SyncRequest {
///     source: RepoId::new("backend").unwrap(),
///     branch: BranchName::new("main").unwrap(),
///     target_branch: BranchName::new("main").unwrap(),
///     submodule_path: GitlinkPath::new("backend").unwrap(),
///     old_revision: Oid::zero(),
///     new_revision: Oid::new("2".repeat(40)).unwrap(),
/// };
/// let previous = Oid::new("1".repeat(40)).unwrap();
/// let message = sync_message(&request, &previous);
/// assert!(message.starts_with("Update backend to 222222222222\n"));
/// ```
pub fn sync_message(request: &SyncRequest, previous: &Oid) -> String {
    format!(
        "Update {path} to {short}\n\
         \n\
         Pin {path} at {new}\n\
         (previously {previous}).\n\
         \n\
         Source: {repo} {branch}\n",
        path = request.submodule_path,
        short = request.new_revision.short(SHORT_HASH),
        new = request.new_revision,
        previous = previous,
        repo = request.source,
        branch = request.branch,
    )
}

/// Writes rewritten trees and synchronization commits.
pub struct CommitBuilder<'a> {
    git: &'a Git,
    identity: Identity,
}

impl<'a> CommitBuilder<'a> {
    /// Create a builder writing commits as `identity`.
    pub fn new(git: &'a Git, identity: Identity) -> Self {
        Self { git, identity }
    }

    /// Write the rewritten trees, leaf to root, and return the new root.
    ///
    /// Each freshly written subtree is substituted into its parent listing
    /// before the parent is written. Writing the same rewrite twice yields
    /// the same root tree.
    pub fn write_trees(&self, rewrite: &TreeRewrite) -> Result<Oid, SyncError> {
        let mut written = self.git.write_tree(rewrite.leaf())?;
        for level in rewrite.ancestors().iter().rev() {
            let patched = level.snapshot.with_target(level.child, written);
            written = self.git.write_tree(&patched)?;
        }
        Ok(written)
    }

    /// Write the trees and a commit whose only parent is `parent`.
    ///
    /// Never reads or writes any ref.
    pub fn build(
        &self,
        rewrite: &TreeRewrite,
        parent: &Oid,
        message: &str,
    ) -> Result<BuiltCommit, SyncError> {
        let tree = self.write_trees(rewrite)?;
        let commit = self
            .git
            .write_commit(&tree, &[parent], message, &self.identity)?;

        debug!(
            tree = %tree.short(SHORT_HASH),
            commit = %commit.short(SHORT_HASH),
            parent = %parent.short(SHORT_HASH),
            "built commit"
        );

        Ok(BuiltCommit { tree, commit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BranchName, GitlinkPath, RepoId};

    fn request(path: &str) -> SyncRequest {
        SyncRequest {
            source: RepoId::new("frontend").unwrap(),
            branch: BranchName::new("develop").unwrap(),
            target_branch: BranchName::new("develop").unwrap(),
            submodule_path: GitlinkPath::new(path).unwrap(),
            old_revision: Oid::zero(),
            new_revision: Oid::new("f1".repeat(20)).unwrap(),
        }
    }

    #[test]
    fn message_names_path_and_hashes() {
        let previous = Oid::new("f0".repeat(20)).unwrap();
        let message = sync_message(&request("services/frontend"), &previous);
        let summary = message.lines().next().unwrap();

        assert_eq!(summary, "Update services/frontend to f1f1f1f1f1f1");
        assert!(message.contains(&"f1".repeat(20)));
        assert!(message.contains(&"f0".repeat(20)));
        assert!(message.contains("Source: frontend develop"));
    }
}
