//! sync::error
//!
//! Error taxonomy for synchronization attempts.
//!
//! Every failure carries an explicit [`ErrorKind`]:
//!
//! - `Validation` - the push is not eligible; nothing was touched
//! - `NotFound` - the aggregator never registered the gitlink path
//! - `ConcurrentUpdate` - the branch moved under us; retried with a fresh read
//! - `SynchronizationFailed` - retries exhausted, lock timeout, or the
//!   object store failed; carries repo, branch and hashes for a manual retry

use thiserror::Error;

use super::filter::Rejection;
use crate::core::ops::lock::LockError;
use crate::core::types::{BranchName, GitlinkPath, Oid, RepoId};
use crate::git::GitError;

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Branch or repository not allow-listed, or malformed input.
    Validation,
    /// Gitlink path absent from the aggregator tree.
    NotFound,
    /// Compare-and-swap mismatch on the branch ref.
    ConcurrentUpdate,
    /// Fatal failure surfaced to the operator.
    SynchronizationFailed,
}

impl ErrorKind {
    /// Get a human-readable description of the kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::ConcurrentUpdate => "concurrent-update",
            ErrorKind::SynchronizationFailed => "synchronization-failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Why a synchronization attempt was abandoned.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// Every attempt lost the compare-and-swap race.
    #[error("branch kept moving; gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Number of CAS attempts made
        attempts: u32,
    },

    /// The branch lock could not be taken in time.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The object store or ref database failed.
    #[error(transparent)]
    Store(#[from] GitError),

    /// A produced commit did not satisfy the single-parent invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Errors from the synchronization components.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The push event is not eligible.
    #[error("rejected: {0}")]
    Validation(#[from] Rejection),

    /// The gitlink path is not registered in the aggregator tree.
    #[error("gitlink '{path}' not found in aggregator commit {}: {detail}", .commit.short(12))]
    NotFound {
        /// The requested gitlink path
        path: GitlinkPath,
        /// The aggregator commit that was searched
        commit: Oid,
        /// Which part of the path was missing or of the wrong kind
        detail: String,
    },

    /// The branch no longer points at the commit the attempt started from.
    #[error("concurrent update of {refname}: expected {expected}, found {actual}")]
    ConcurrentUpdate {
        /// The branch ref
        refname: String,
        /// The tip observed at the start of the attempt
        expected: String,
        /// The tip found at update time
        actual: String,
    },

    /// A component failed below the coordinator (object store, invariant).
    #[error("{0}")]
    Component(FailureCause),

    /// The attempt was abandoned; nothing was published.
    #[error(
        "synchronization of {repo} into {branch} failed (tip {}, attempted {}): {cause}",
        display_oid(.observed_tip),
        display_oid(.attempted)
    )]
    SynchronizationFailed {
        /// Dependent repository that triggered the attempt
        repo: RepoId,
        /// Aggregator branch
        branch: BranchName,
        /// Gitlink path
        path: GitlinkPath,
        /// Dependent revision that was to be pinned
        revision: Oid,
        /// Last aggregator tip observed, if any
        observed_tip: Option<Oid>,
        /// Last commit we tried to publish, if any
        attempted: Option<Oid>,
        /// What went wrong
        #[source]
        cause: FailureCause,
    },
}

fn display_oid(oid: &Option<Oid>) -> String {
    oid.as_ref()
        .map(|o| o.short(12).to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl From<GitError> for SyncError {
    fn from(err: GitError) -> Self {
        SyncError::Component(FailureCause::Store(err))
    }
}

impl SyncError {
    /// The error's kind in the taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::ConcurrentUpdate { .. } => ErrorKind::ConcurrentUpdate,
            SyncError::Component(_) | SyncError::SynchronizationFailed { .. } => {
                ErrorKind::SynchronizationFailed
            }
        }
    }

    /// Process exit status for this error.
    ///
    /// Rejections are not failures: the push simply does not concern the
    /// aggregator.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Validation => 0,
            ErrorKind::NotFound => 2,
            ErrorKind::ConcurrentUpdate | ErrorKind::SynchronizationFailed => 3,
        }
    }

    /// The aggregator tip the failed attempt was based on, if known.
    pub fn observed_tip(&self) -> Option<&Oid> {
        match self {
            SyncError::NotFound { commit, .. } => Some(commit),
            SyncError::SynchronizationFailed { observed_tip, .. } => observed_tip.as_ref(),
            _ => None,
        }
    }

    /// The commit the failed attempt tried to publish, if any.
    pub fn attempted(&self) -> Option<&Oid> {
        match self {
            SyncError::SynchronizationFailed { attempted, .. } => attempted.as_ref(),
            _ => None,
        }
    }
}
