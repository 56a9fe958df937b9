//! sync::advance
//!
//! Ref advancer: publishes a built commit by compare-and-swap.
//!
//! This is the only code in the crate that moves a branch. The update goes
//! through [`Git::update_ref_cas`]; there is no unconditional write path.

use tracing::debug;

use super::error::{FailureCause, SyncError};
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::{Git, GitError};

/// Advances aggregator branches.
pub struct RefAdvancer<'a> {
    git: &'a Git,
}

impl<'a> RefAdvancer<'a> {
    /// Create an advancer over `git`.
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Move `branch` from `expected_old` to `new`.
    ///
    /// `new` must be a commit whose only parent is `expected_old`; this is
    /// checked before the ref is touched.
    ///
    /// # Errors
    ///
    /// - [`SyncError::ConcurrentUpdate`] if the branch no longer points at
    ///   `expected_old` (or its ref is being written right now)
    /// - [`SyncError::Component`] for a parent mismatch or store failure
    pub fn advance(
        &self,
        branch: &BranchName,
        expected_old: &Oid,
        new: &Oid,
        reflog: &str,
    ) -> Result<(), SyncError> {
        let parents = self.git.commit_parents(new)?;
        if parents.as_slice() != std::slice::from_ref(expected_old) {
            return Err(SyncError::Component(FailureCause::Invariant(format!(
                "commit {} has parents [{}], expected exactly {}",
                new,
                parents
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                expected_old
            ))));
        }

        let refname = RefName::for_branch(branch);
        match self
            .git
            .update_ref_cas(refname.as_str(), new, expected_old, reflog)
        {
            Ok(()) => {
                debug!(refname = %refname, old = %expected_old, new = %new, "ref advanced");
                Ok(())
            }
            Err(e) if e.is_concurrent_update() => Err(concurrent_update(e, expected_old)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Translate a lost compare-and-swap into the retryable error.
fn concurrent_update(err: GitError, expected_old: &Oid) -> SyncError {
    match err {
        GitError::CasFailed {
            refname,
            expected,
            actual,
        } => SyncError::ConcurrentUpdate {
            refname,
            expected,
            actual,
        },
        GitError::RefLocked { refname } => SyncError::ConcurrentUpdate {
            refname,
            expected: expected_old.to_string(),
            actual: "<locked>".to_string(),
        },
        other => other.into(),
    }
}

/// Reflog message recorded when a branch is advanced.
pub fn reflog_message(repo: &str, path: &str, old: &Oid, new: &Oid) -> String {
    format!(
        "gitlink-sync: {} {} {}..{}",
        repo,
        path,
        old.short(12),
        new.short(12)
    )
}
