//! core::types
//!
//! Strong types for the synchronization domain.
//!
//! # Types
//!
//! - [`Oid`] - Git object identifier (SHA)
//! - [`BranchName`] - Validated Git branch name
//! - [`RefName`] - Validated full Git reference name
//! - [`RepoId`] - Identifier of a dependent repository
//! - [`GitlinkPath`] - Location of a gitlink inside the aggregator tree
//!
//! # Validation
//!
//! These types enforce validity at construction time. A push event that
//! cannot be expressed in these types never reaches the object store.
//!
//! # Examples
//!
//! ```
//! use gitlink_sync::core::types::{BranchName, GitlinkPath, Oid, RefName, RepoId};
//!
//! let branch = BranchName::new("main").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/main");
//!
//! assert!(Oid::new("not-a-sha").is_err());
//! assert!(RepoId::new("../escape").is_err());
//! assert!(GitlinkPath::new("services//frontend").is_err());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),

    #[error("invalid gitlink path: {0}")]
    InvalidGitlinkPath(String),
}

/// Implements the string plumbing shared by every validated newtype.
macro_rules! string_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Get the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $ty {
            type Error = TypeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

/// Check a name against the `git check-ref-format` rules shared by branch
/// names and full ref names. Returns the violated rule on failure.
fn check_ref_format(name: &str) -> Result<(), String> {
    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name == "@" {
        return Err("cannot be '@' (reserved)".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("cannot start or end with '/'".into());
    }
    if name.ends_with('.') {
        return Err("cannot end with '.'".into());
    }
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("cannot contain '{bad}'"));
        }
    }
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(format!("cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("cannot contain control characters".into());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase so that equality checks in the
/// compare-and-swap path are plain string comparisons.
///
/// # Example
///
/// ```
/// use gitlink_sync::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    const ZERO_SHA1: &'static str = "0000000000000000000000000000000000000000";

    /// Create a new validated object id, normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 or 64 hex chars.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// The null revision hooks use for ref creation and deletion.
    pub fn zero() -> Self {
        Self(Self::ZERO_SHA1.to_string())
    }

    /// Check if this is the null revision.
    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    /// Abbreviated form: the first `len` characters (or the whole OID).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

string_newtype!(Oid);

/// A validated Git branch name (the part after `refs/heads/`).
///
/// # Example
///
/// ```
/// use gitlink_sync::core::types::BranchName;
///
/// assert!(BranchName::new("develop").is_ok());
/// assert!(BranchName::new("release/1.2").is_ok());
/// assert!(BranchName::new("-flag").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_ref_format(&name)
            .map_err(|rule| TypeError::InvalidBranchName(format!("branch name {rule}")))?;
        Ok(Self(name))
    }
}

string_newtype!(BranchName);

/// A validated full Git reference name such as `refs/heads/main`.
///
/// # Example
///
/// ```
/// use gitlink_sync::core::types::RefName;
///
/// let refname = RefName::new("refs/heads/develop").unwrap();
/// assert_eq!(refname.branch_name().unwrap().as_str(), "develop");
///
/// let tag = RefName::new("refs/tags/v1.0").unwrap();
/// assert!(tag.branch_name().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Prefix of local branch refs.
    pub const HEADS_PREFIX: &'static str = "refs/heads/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_ref_format(&name)
            .map_err(|rule| TypeError::InvalidRefName(format!("ref name {rule}")))?;
        Ok(Self(name))
    }

    /// The ref for a local branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::HEADS_PREFIX, branch.as_str()))
    }

    /// The branch this ref names, if it is under `refs/heads/`.
    pub fn branch_name(&self) -> Option<BranchName> {
        self.0
            .strip_prefix(Self::HEADS_PREFIX)
            .and_then(|name| BranchName::new(name).ok())
    }
}

string_newtype!(RefName);

/// Identifier of a dependent repository, as listed in the allow-list.
///
/// Identifiers are plain names (`backend`, `web-frontend`); hook
/// invocations usually derive them from the repository directory.
///
/// # Example
///
/// ```
/// use gitlink_sync::core::types::RepoId;
/// use std::path::Path;
///
/// let id = RepoId::from_repo_path(Path::new("/srv/git/backend.git")).unwrap();
/// assert_eq!(id.as_str(), "backend");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Create a new validated repository id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepoId` unless the id is non-empty, made of
    /// `[A-Za-z0-9._-]`, and does not start with `.`.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidRepoId("id cannot be empty".into()));
        }
        if id.starts_with('.') {
            return Err(TypeError::InvalidRepoId(format!(
                "'{id}' cannot start with '.'"
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(TypeError::InvalidRepoId(format!(
                "'{id}' contains invalid character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Derive an id from a repository location: the final path component
    /// with any `.git` suffix removed. A path ending in `.git` that is the
    /// git directory of a non-bare repository resolves to its parent.
    pub fn from_repo_path(path: &Path) -> Result<Self, TypeError> {
        let mut name = path.file_name().and_then(|n| n.to_str());
        if name == Some(".git") {
            name = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
        }
        let name = name
            .ok_or_else(|| TypeError::InvalidRepoId(format!("no name in {}", path.display())))?;
        Self::new(name.strip_suffix(".git").unwrap_or(name))
    }
}

string_newtype!(RepoId);

/// Path of a gitlink entry relative to the aggregator tree root.
///
/// # Example
///
/// ```
/// use gitlink_sync::core::types::GitlinkPath;
///
/// let path = GitlinkPath::new("services/frontend").unwrap();
/// assert_eq!(path.components().collect::<Vec<_>>(), vec!["services", "frontend"]);
/// assert_eq!(path.file_name(), "frontend");
/// assert!(GitlinkPath::new("../outside").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitlinkPath(String);

impl GitlinkPath {
    /// Create a new validated gitlink path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidGitlinkPath` for absolute paths, empty
    /// components, `.`/`..` components, or NUL bytes.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        if path.is_empty() {
            return Err(TypeError::InvalidGitlinkPath("path cannot be empty".into()));
        }
        if path.contains('\0') || path.contains('\\') {
            return Err(TypeError::InvalidGitlinkPath(format!(
                "'{}' contains a forbidden character",
                path.escape_default()
            )));
        }
        for component in path.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(TypeError::InvalidGitlinkPath(format!(
                    "'{path}' has an empty or relative component"
                )));
            }
        }
        Ok(Self(path))
    }

    /// The `/`-separated components, root first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The final component (the entry name inside its parent tree).
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

string_newtype!(GitlinkPath);

#[cfg(test)]
mod tests {
    use super::*;

    mod oid {
        use super::*;

        #[test]
        fn accepts_sha1_and_sha256() {
            assert!(Oid::new("a".repeat(40)).is_ok());
            assert!(Oid::new("b".repeat(64)).is_ok());
        }

        #[test]
        fn rejects_wrong_length_and_non_hex() {
            assert!(Oid::new("abc").is_err());
            assert!(Oid::new("g".repeat(40)).is_err());
            assert!(Oid::new("").is_err());
        }

        #[test]
        fn normalizes_case() {
            let upper = Oid::new("A".repeat(40)).unwrap();
            let lower = Oid::new("a".repeat(40)).unwrap();
            assert_eq!(upper, lower);
        }

        #[test]
        fn zero_detection() {
            assert!(Oid::zero().is_zero());
            assert!(Oid::new("0".repeat(64)).unwrap().is_zero());
            assert!(!Oid::new("1".repeat(40)).unwrap().is_zero());
        }

        #[test]
        fn short_clamps_to_length() {
            let oid = Oid::new("c".repeat(40)).unwrap();
            assert_eq!(oid.short(100).len(), 40);
        }

        #[test]
        fn serde_rejects_invalid() {
            let parsed: Result<Oid, _> = serde_json::from_str("\"xyz\"");
            assert!(parsed.is_err());
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_branch_names() {
            for name in ["main", "develop", "release/1.0", "fix-123", "user@feature"] {
                assert!(BranchName::new(name).is_ok(), "{name} should be valid");
            }
        }

        #[test]
        fn invalid_branch_names() {
            for name in [
                "", "@", ".hidden", "a/.b", "-flag", "x.lock", "a/", "a..b", "a@{b", "a//b",
                "sp ace", "ti~lde", "col:on", "end.",
            ] {
                assert!(BranchName::new(name).is_err(), "{name:?} should be invalid");
            }
        }

        #[test]
        fn control_characters_rejected() {
            assert!(BranchName::new("bad\x07bell").is_err());
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn for_branch_round_trips() {
            let branch = BranchName::new("feature/x").unwrap();
            let refname = RefName::for_branch(&branch);
            assert_eq!(refname.as_str(), "refs/heads/feature/x");
            assert_eq!(refname.branch_name(), Some(branch));
        }

        #[test]
        fn non_branch_refs_have_no_branch_name() {
            assert!(RefName::new("refs/tags/v1").unwrap().branch_name().is_none());
            assert!(RefName::new("HEAD").unwrap().branch_name().is_none());
        }

        #[test]
        fn malformed_refs_rejected() {
            assert!(RefName::new("refs/heads/").is_err());
            assert!(RefName::new("/refs/heads/main").is_err());
            assert!(RefName::new("refs/heads/a..b").is_err());
        }
    }

    mod repo_id {
        use super::*;

        #[test]
        fn valid_ids() {
            for id in ["backend", "web-frontend", "svc_2", "a.b"] {
                assert!(RepoId::new(id).is_ok(), "{id} should be valid");
            }
        }

        #[test]
        fn invalid_ids() {
            for id in ["", ".hidden", "a/b", "a b", "../x"] {
                assert!(RepoId::new(id).is_err(), "{id:?} should be invalid");
            }
        }

        #[test]
        fn derived_from_bare_path() {
            let id = RepoId::from_repo_path(Path::new("/srv/git/frontend.git")).unwrap();
            assert_eq!(id.as_str(), "frontend");
        }

        #[test]
        fn derived_from_non_bare_git_dir() {
            let id = RepoId::from_repo_path(Path::new("/work/backend/.git")).unwrap();
            assert_eq!(id.as_str(), "backend");
        }

        #[test]
        fn derived_from_root_fails() {
            assert!(RepoId::from_repo_path(Path::new("/")).is_err());
        }
    }

    mod gitlink_path {
        use super::*;

        #[test]
        fn single_component() {
            let path = GitlinkPath::new("backend").unwrap();
            assert_eq!(path.file_name(), "backend");
            assert_eq!(path.components().count(), 1);
        }

        #[test]
        fn nested_components() {
            let path = GitlinkPath::new("a/b/c").unwrap();
            assert_eq!(path.components().collect::<Vec<_>>(), ["a", "b", "c"]);
            assert_eq!(path.file_name(), "c");
        }

        #[test]
        fn rejects_relative_and_empty_components() {
            for p in ["", "/abs", "trailing/", "a//b", "./a", "a/../b", "a\\b"] {
                assert!(GitlinkPath::new(p).is_err(), "{p:?} should be invalid");
            }
        }
    }
}
