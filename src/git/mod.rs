//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All object-store reads and
//! writes flow through this interface. No other module should import `git2`,
//! and nothing shells out to the git CLI.
//!
//! # Responsibilities
//!
//! - Opening a repository at an exact path (bare or not)
//! - Ref resolution and CAS update
//! - Tree read/write as structured [`TreeSnapshot`]s
//! - Commit read/write
//!
//! # Invariants
//!
//! - All ref updates use CAS (compare-and-swap) semantics
//! - Object writes never move a ref; only [`Git::update_ref_cas`] does
//! - All operations return strong types (Oid, TreeSnapshot)
//!
//! # Example
//!
//! ```ignore
//! use gitlink_sync::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/git/platform.git"))?;
//! let tip = git.resolve_ref("refs/heads/main")?;
//!
//! // CAS update (fails if the branch moved since `tip` was read)
//! git.update_ref_cas("refs/heads/main", &new_commit, &tip, "gitlink-sync: backend")?;
//! ```

mod interface;
mod tree;

pub use interface::{CommitInfo, Git, GitError, Identity};
pub use tree::{EntryKind, TreeEntry, TreeSnapshot, GITLINK_MODE, TREE_MODE};
