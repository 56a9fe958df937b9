//! core::paths
//!
//! Centralized path routing for gitlink-sync storage locations.
//!
//! # Storage Layout
//!
//! All state lives under `<git_dir>/gitlink-sync/` of the aggregator:
//! - `locks/<branch>.lock` - One lock file per aggregator branch
//!
//! Branch names may contain `/`, so they are percent-encoded into a single
//! file name. No code outside this module should compute these paths.
//!
//! # Example
//!
//! ```
//! use gitlink_sync::core::paths::SyncPaths;
//! use gitlink_sync::core::types::BranchName;
//! use std::path::PathBuf;
//!
//! let paths = SyncPaths::new(PathBuf::from("/srv/git/platform.git"));
//! let branch = BranchName::new("release/2.0").unwrap();
//!
//! assert_eq!(
//!     paths.branch_lock_path(&branch),
//!     PathBuf::from("/srv/git/platform.git/gitlink-sync/locks/release%2F2.0.lock")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::BranchName;

/// Path routing for one aggregator repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPaths {
    /// The aggregator's git directory (the repository itself when bare).
    pub git_dir: PathBuf,
}

impl SyncPaths {
    /// Create paths rooted at an aggregator git directory.
    pub fn new(git_dir: PathBuf) -> Self {
        Self { git_dir }
    }

    /// Root of all gitlink-sync state.
    pub fn state_dir(&self) -> PathBuf {
        self.git_dir.join("gitlink-sync")
    }

    /// Directory holding per-branch lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    /// Lock file for one aggregator branch.
    pub fn branch_lock_path(&self, branch: &BranchName) -> PathBuf {
        self.locks_dir()
            .join(format!("{}.lock", encode_component(branch.as_str())))
    }

    /// Get the git_dir as a Path reference.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

/// Percent-encode `%` and `/` so a branch name becomes one path component.
fn encode_component(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}
