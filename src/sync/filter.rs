//! sync::filter
//!
//! Eligibility filter: decides whether a push event triggers synchronization.
//!
//! # Fail closed
//!
//! Every check rejects rather than accepting by default. A push is accepted
//! only when all of the following hold:
//!
//! - the source repository is allow-listed and mapped to a gitlink path
//! - the ref is a branch (`refs/heads/*`) matching the branch pattern
//! - the hook line has exactly three fields
//! - both revisions parse as object ids as wide as the aggregator's, and
//!   the new one is not zero
//!
//! The filter is a pure decision function. It performs no I/O.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::core::config::{Config, ConfigError};
use crate::core::types::{BranchName, GitlinkPath, Oid, RefName, RepoId};

/// Why a push event was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The hook line does not have the `old new ref` shape.
    #[error("malformed hook line: {line:?}")]
    MalformedLine {
        /// The offending line
        line: String,
    },

    /// A revision field is not an object id.
    #[error("invalid revision {value:?}")]
    InvalidRevision {
        /// The offending field
        value: String,
    },

    /// A revision is a valid object id of the wrong hash width.
    #[error("revision {value} is not a {expected}-digit object id")]
    WrongHashWidth {
        /// The offending field
        value: String,
        /// Hex digits used by the aggregator
        expected: usize,
    },

    /// The ref name is not valid or not a branch.
    #[error("{refname} is not a branch")]
    NotABranch {
        /// The pushed ref
        refname: String,
    },

    /// The push deleted the branch.
    #[error("branch {branch} was deleted")]
    BranchDeleted {
        /// The deleted branch
        branch: BranchName,
    },

    /// The branch does not match the allow pattern.
    #[error("branch {branch} does not match {pattern}")]
    BranchNotAllowed {
        /// The pushed branch
        branch: BranchName,
        /// The configured pattern
        pattern: String,
    },

    /// The source identifier is not a valid repository id.
    #[error("invalid source repository {value:?}")]
    InvalidSource {
        /// The offending identifier
        value: String,
    },

    /// The source repository is not allow-listed.
    #[error("repository {repo} is not allow-listed")]
    UnknownRepo {
        /// The source repository
        repo: RepoId,
    },

    /// The source repository has no gitlink path in the aggregator.
    #[error("repository {repo} has no gitlink mapping")]
    UnmappedRepo {
        /// The source repository
        repo: RepoId,
    },
}

/// An accepted push event, ready for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Dependent repository that was pushed to
    pub source: RepoId,
    /// Branch that was pushed
    pub branch: BranchName,
    /// Aggregator branch to advance
    pub target_branch: BranchName,
    /// Gitlink path inside the aggregator
    pub submodule_path: GitlinkPath,
    /// Previous tip of the pushed branch (zero on creation)
    pub old_revision: Oid,
    /// New tip of the pushed branch; the revision to pin
    pub new_revision: Oid,
}

/// Where an eligible push lands in the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Dependent repository
    pub source: RepoId,
    /// Pushed branch
    pub branch: BranchName,
    /// Aggregator branch to advance
    pub target_branch: BranchName,
    /// Gitlink path inside the aggregator
    pub submodule_path: GitlinkPath,
}

/// Outcome of evaluating one push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Synchronize with this request.
    Accept(SyncRequest),
    /// Do nothing, for this reason.
    Reject(Rejection),
}

impl Decision {
    /// Whether the event was accepted.
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }

    /// Convert into a `Result`, with the rejection as the error.
    pub fn into_result(self) -> Result<SyncRequest, Rejection> {
        match self {
            Decision::Accept(request) => Ok(request),
            Decision::Reject(rejection) => Err(rejection),
        }
    }
}

/// Static allow-lists for branches and repositories.
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    branch_allow: Regex,
    repo_allow: Vec<RepoId>,
}

impl EligibilityPolicy {
    /// Build a policy from a branch pattern and a repository allow-list.
    pub fn new(
        branch_allow_pattern: &str,
        repo_allow: impl IntoIterator<Item = RepoId>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            branch_allow: Regex::new(branch_allow_pattern)?,
            repo_allow: repo_allow.into_iter().collect(),
        })
    }

    /// The branch pattern as written.
    pub fn branch_pattern(&self) -> &str {
        self.branch_allow.as_str()
    }

    /// Whether pushes to `branch` are eligible.
    pub fn allows_branch(&self, branch: &BranchName) -> bool {
        self.branch_allow.is_match(branch.as_str())
    }

    /// Whether pushes from `repo` are eligible.
    pub fn allows_repo(&self, repo: &RepoId) -> bool {
        self.repo_allow.contains(repo)
    }
}

/// The eligibility filter: policy plus the repository-to-path mapping.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    policy: EligibilityPolicy,
    mappings: BTreeMap<RepoId, GitlinkPath>,
    target_branch: Option<BranchName>,
    revision_hex_len: usize,
}

impl EligibilityFilter {
    /// Create a filter.
    ///
    /// `target_branch` fixes the aggregator branch; `None` mirrors the
    /// pushed branch.
    pub fn new(
        policy: EligibilityPolicy,
        mappings: BTreeMap<RepoId, GitlinkPath>,
        target_branch: Option<BranchName>,
    ) -> Self {
        Self {
            policy,
            mappings,
            target_branch,
            revision_hex_len: 40,
        }
    }

    /// Accept only revisions with `len` hex digits (40 unless set).
    pub fn with_revision_hex_len(mut self, len: usize) -> Self {
        self.revision_hex_len = len;
        self
    }

    /// Build the filter from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let repos = config
            .repo_allow()
            .iter()
            .map(|id| RepoId::new(id.as_str()).map_err(invalid))
            .collect::<Result<Vec<_>, _>>()?;
        let policy =
            EligibilityPolicy::new(config.branch_allow_pattern(), repos).map_err(invalid)?;

        let mut mappings = BTreeMap::new();
        for (id, path) in config.dependents() {
            let id = RepoId::new(id.as_str()).map_err(invalid)?;
            let path = GitlinkPath::new(path.as_str()).map_err(invalid)?;
            mappings.insert(id, path);
        }

        let target_branch = config
            .aggregator_branch()
            .map(BranchName::new)
            .transpose()
            .map_err(invalid)?;

        Ok(Self::new(policy, mappings, target_branch))
    }

    /// The underlying policy.
    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Evaluate one `old new ref` hook line from `source`.
    pub fn evaluate_line(&self, line: &str, source: &str) -> Decision {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [old, new, refname] => self.evaluate(old, new, refname, source),
            _ => Decision::Reject(Rejection::MalformedLine {
                line: line.to_string(),
            }),
        }
    }

    /// Evaluate a push event.
    pub fn evaluate(&self, old: &str, new: &str, refname: &str, source: &str) -> Decision {
        match self.check(old, new, refname, source) {
            Ok(request) => Decision::Accept(request),
            Err(rejection) => Decision::Reject(rejection),
        }
    }

    /// Decide where pushes of `refname` from `source` would land, without
    /// looking at revisions.
    pub fn route(&self, refname: &str, source: &str) -> Result<Route, Rejection> {
        // Repository checks come first: unknown repos are rejected
        // regardless of what they pushed.
        let repo = RepoId::new(source).map_err(|_| Rejection::InvalidSource {
            value: source.to_string(),
        })?;
        if !self.policy.allows_repo(&repo) {
            return Err(Rejection::UnknownRepo { repo });
        }

        let branch = RefName::new(refname)
            .ok()
            .and_then(|r| r.branch_name())
            .ok_or_else(|| Rejection::NotABranch {
                refname: refname.to_string(),
            })?;
        if !self.policy.allows_branch(&branch) {
            return Err(Rejection::BranchNotAllowed {
                branch,
                pattern: self.policy.branch_pattern().to_string(),
            });
        }

        let submodule_path = self
            .mappings
            .get(&repo)
            .cloned()
            .ok_or_else(|| Rejection::UnmappedRepo { repo: repo.clone() })?;

        let target_branch = self
            .target_branch
            .clone()
            .unwrap_or_else(|| branch.clone());

        Ok(Route {
            source: repo,
            branch,
            target_branch,
            submodule_path,
        })
    }

    fn check(
        &self,
        old: &str,
        new: &str,
        refname: &str,
        source: &str,
    ) -> Result<SyncRequest, Rejection> {
        let route = self.route(refname, source)?;

        let old_revision = self.parse_revision(old)?;
        let new_revision = self.parse_revision(new)?;
        if new_revision.is_zero() {
            return Err(Rejection::BranchDeleted {
                branch: route.branch,
            });
        }

        Ok(SyncRequest {
            source: route.source,
            branch: route.branch,
            target_branch: route.target_branch,
            submodule_path: route.submodule_path,
            old_revision,
            new_revision,
        })
    }

    fn parse_revision(&self, value: &str) -> Result<Oid, Rejection> {
        let oid = Oid::new(value).map_err(|_| Rejection::InvalidRevision {
            value: value.to_string(),
        })?;
        if oid.as_str().len() != self.revision_hex_len {
            return Err(Rejection::WrongHashWidth {
                value: value.to_string(),
                expected: self.revision_hex_len,
            });
        }
        Ok(oid)
    }
}

fn invalid(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue(err.to_string())
}
