//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to the aggregator's object
//! store. All reads and writes flow through this interface, which provides
//! structured results and normalizes errors into typed failure categories.
//!
//! # Architecture
//!
//! The `Git` struct is the handle for one aggregator repository. It is opened
//! from an explicit path and never depends on the process working directory,
//! so several handles (for the same or different repositories) can coexist.
//! No other module should import `git2` directly.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Path is not a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::ObjectNotFound`]: Requested object does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::RefLocked`]: Another writer holds the ref's lock file
//!
//! # Example
//!
//! ```ignore
//! use gitlink_sync::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/git/platform.git"))?;
//! let tip = git.resolve_ref("refs/heads/main")?;
//! let tree = git.read_tree(&git.commit_tree(&tip)?)?;
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::tree::{TreeEntry, TreeSnapshot};
use crate::core::types::{Oid, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path is not a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref's current value differs from the value the caller observed,
    /// meaning another writer advanced it in the meantime.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// The ref is being updated by another writer right now.
    #[error("ref is locked by another writer: {refname}")]
    RefLocked {
        /// The ref being updated
        refname: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Object exists but has an unexpected type.
    #[error("object {oid} is not a {expected}")]
    WrongObjectType {
        /// The OID that was looked up
        oid: String,
        /// The type that was required
        expected: &'static str,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::RefLocked {
                refname: context.to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    /// Whether the failure means "someone else moved or is moving the ref".
    pub fn is_concurrent_update(&self) -> bool {
        matches!(self, GitError::CasFailed { .. } | GitError::RefLocked { .. })
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            other => GitError::InvalidRefName {
                message: other.to_string(),
            },
        }
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// The root tree OID
    pub tree: Oid,
    /// Parent commit OIDs
    pub parents: Vec<Oid>,
    /// First line of the commit message
    pub summary: String,
    /// Full commit message
    pub message: String,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Commit timestamp
    pub time: chrono::DateTime<chrono::Utc>,
}

/// Identity recorded as author and committer of synchronization commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
}

/// The Git interface.
///
/// This is the **single point of interaction** with the object store.
///
/// # CAS Semantics
///
/// Ref mutation uses compare-and-swap semantics: [`Git::update_ref_cas`]
/// only moves a ref whose current value still equals the expected one. The
/// check and the write happen under the ref's own lock file, so two
/// processes cannot both succeed from the same observed value.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

/// Hex digits in the object store's ids.
fn store_hex_len() -> usize {
    git2::Oid::zero().as_bytes().len() * 2
}

/// Convert a validated OID to git2's representation.
///
/// The hex form must be exactly as wide as the object store's ids.
fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    if oid.as_str().len() != store_hex_len() {
        return Err(GitError::InvalidOid {
            oid: oid.to_string(),
        });
    }
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

/// Convert a git2 OID to the validated representation.
fn from_git2(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository at exactly `path`.
    ///
    /// `path` may be a bare repository, a `.git` directory, or the top of a
    /// working tree. Parent directories are not searched and `$GIT_DIR` is
    /// ignored, so a hook running inside another repository can never open
    /// it by accident.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not itself a repository
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open_ext(
            path,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Number of hex digits in this repository's object ids.
    pub fn oid_hex_len(&self) -> usize {
        store_hex_len()
    }

    /// Get direct access to the git directory path.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        from_git2(oid)
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read the direct target of a ref without peeling.
    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // CAS Ref Operations
    // =========================================================================

    /// Update a ref with compare-and-swap semantics.
    ///
    /// The ref moves to `new_oid` only if it currently points at
    /// `expected_old`. The comparison is performed by the reference backend
    /// while it holds the ref lock, so it is atomic with respect to other
    /// writers, including other processes and the `git` CLI.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    /// - [`GitError::RefLocked`] if another writer holds the ref lock
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: &Oid,
        message: &str,
    ) -> Result<(), GitError> {
        let new = to_git2(new_oid)?;
        let expected = to_git2(expected_old)?;

        match self
            .repo
            .reference_matching(refname, new, true, expected, message)
        {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::Modified | git2::ErrorCode::NotFound
                ) =>
            {
                let actual = self
                    .try_resolve_ref_raw(refname)?
                    .unwrap_or_else(|| "<none>".to_string());
                Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected_old.to_string(),
                    actual,
                })
            }
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Commit Operations
    // =========================================================================

    fn find_commit(&self, oid: &Oid) -> Result<git2::Commit<'_>, GitError> {
        let commit = self
            .repo
            .find_object(to_git2(oid)?, None)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        commit.into_commit().map_err(|_| GitError::WrongObjectType {
            oid: oid.to_string(),
            expected: "commit",
        })
    }

    /// Get the root tree of a commit.
    pub fn commit_tree(&self, oid: &Oid) -> Result<Oid, GitError> {
        from_git2(self.find_commit(oid)?.tree_id())
    }

    /// Get the parent OIDs of a commit.
    ///
    /// Returns empty vec for root commits, multiple OIDs for merge commits.
    pub fn commit_parents(&self, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        self.find_commit(oid)?
            .parent_ids()
            .map(from_git2)
            .collect()
    }

    /// Get information about a commit.
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self.find_commit(oid)?;
        let author = commit.author();
        let time = chrono::DateTime::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH);

        Ok(CommitInfo {
            oid: oid.clone(),
            tree: from_git2(commit.tree_id())?,
            parents: commit
                .parent_ids()
                .map(from_git2)
                .collect::<Result<_, _>>()?,
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            time,
        })
    }

    /// Write a commit object. No ref is touched.
    pub fn write_commit(
        &self,
        tree: &Oid,
        parents: &[&Oid],
        message: &str,
        identity: &Identity,
    ) -> Result<Oid, GitError> {
        let tree = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let parent_commits = parents
            .iter()
            .map(|oid| self.find_commit(oid))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let signature = git2::Signature::now(&identity.name, &identity.email)
            .map_err(|e| GitError::from_git2(e, "signature"))?;

        let oid = self
            .repo
            .commit(None, &signature, &signature, message, &tree, &parent_refs)
            .map_err(|e| GitError::from_git2(e, "commit"))?;

        from_git2(oid)
    }

    // =========================================================================
    // Tree Operations
    // =========================================================================

    /// Read a tree object into a snapshot, preserving stored order.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the tree doesn't exist
    /// - [`GitError::WrongObjectType`] if the object is not a tree
    pub fn read_tree(&self, oid: &Oid) -> Result<TreeSnapshot, GitError> {
        let object = self
            .repo
            .find_object(to_git2(oid)?, None)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        let tree = object.into_tree().map_err(|_| GitError::WrongObjectType {
            oid: oid.to_string(),
            expected: "tree",
        })?;

        let entries = tree
            .iter()
            .map(|entry| {
                Ok(TreeEntry {
                    name: entry.name_bytes().to_vec(),
                    mode: entry.filemode_raw() as u32,
                    oid: from_git2(entry.id())?,
                })
            })
            .collect::<Result<Vec<_>, GitError>>()?;

        Ok(TreeSnapshot::from_entries(entries))
    }

    /// Write a snapshot as a tree object, entries verbatim and in order.
    ///
    /// The object is serialized directly rather than through a tree builder
    /// so unchanged entries keep their exact bytes.
    pub fn write_tree(&self, snapshot: &TreeSnapshot) -> Result<Oid, GitError> {
        let body = tree_object_body(snapshot)?;
        let odb = self
            .repo
            .odb()
            .map_err(|e| GitError::from_git2(e, "object database"))?;
        let oid = odb
            .write(git2::ObjectType::Tree, &body)
            .map_err(|e| GitError::from_git2(e, "tree"))?;
        from_git2(oid)
    }
}

/// Canonical tree object body: `<octal mode> SP <name> NUL <raw id>` per
/// entry, in snapshot order.
///
/// Every id is checked against the store's width before anything is
/// written, so a mis-sized id fails here instead of producing a tree git
/// cannot parse.
fn tree_object_body(snapshot: &TreeSnapshot) -> Result<Vec<u8>, GitError> {
    let mut body = Vec::new();
    for entry in snapshot.entries() {
        let oid = to_git2(&entry.oid)?;
        body.extend_from_slice(format!("{:o}", entry.mode).as_bytes());
        body.push(b' ');
        body.extend_from_slice(&entry.name);
        body.push(0);
        body.extend_from_slice(oid.as_bytes());
    }
    Ok(body)
}
