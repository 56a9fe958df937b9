//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing so that the synchronization
//! logic only ever sees well-formed patterns, identifiers and paths.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{BranchName, GitlinkPath, RepoId};

/// Upper bound accepted for `sync.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// The whole configuration document.
///
/// # Example
///
/// ```toml
/// [aggregator]
/// path = "/srv/git/platform.git"
/// branch = "main"
///
/// [policy]
/// branch_allow_pattern = "^(main|develop)$"
/// repo_allow = ["backend", "frontend"]
///
/// [dependents]
/// backend = "backend"
/// frontend = "services/frontend"
///
/// [sync]
/// max_retries = 5
/// lock_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// The aggregator repository
    pub aggregator: AggregatorConfig,

    /// Eligibility policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Source repository id -> gitlink path in the aggregator
    #[serde(default)]
    pub dependents: BTreeMap<String, String>,

    /// Retry and locking behaviour
    #[serde(default)]
    pub sync: RetryConfig,

    /// Identity of generated commits
    #[serde(default)]
    pub commit: CommitConfig,

    /// Event notification
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl SyncConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aggregator.validate()?;
        self.policy.validate()?;
        self.sync.validate()?;

        for (id, path) in &self.dependents {
            RepoId::new(id.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid dependents key: {}", e))
            })?;
            GitlinkPath::new(path.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid path for dependent '{}': {}", id, e))
            })?;
        }

        Ok(())
    }
}

/// Location and branch of the aggregator repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AggregatorConfig {
    /// Repository path (relative paths resolve against the config file)
    pub path: PathBuf,

    /// Branch to advance; when unset the pushed branch name is mirrored
    #[serde(default)]
    pub branch: Option<String>,
}

impl AggregatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "aggregator.path cannot be empty".to_string(),
            ));
        }
        if let Some(branch) = &self.branch {
            BranchName::new(branch.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid aggregator.branch: {}", e))
            })?;
        }
        Ok(())
    }
}

/// Which pushes are eligible for synchronization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Regular expression matched against the pushed branch name
    pub branch_allow_pattern: Option<String>,

    /// Explicit allow-list of dependent repository ids
    pub repo_allow: Vec<String>,
}

impl PolicyConfig {
    /// Default branch pattern: exactly `main` or `develop`.
    pub const DEFAULT_BRANCH_PATTERN: &'static str = "^(main|develop)$";

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pattern) = &self.branch_allow_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid policy.branch_allow_pattern: {}", e))
            })?;
        }
        for id in &self.repo_allow {
            RepoId::new(id.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid policy.repo_allow entry: {}", e))
            })?;
        }
        Ok(())
    }
}

/// Retry, backoff and lock timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Additional attempts after a concurrent update (default 5)
    pub max_retries: Option<u32>,

    /// First backoff delay in milliseconds (default 50)
    pub backoff_initial_ms: Option<u64>,

    /// Backoff ceiling in milliseconds (default 1000)
    pub backoff_max_ms: Option<u64>,

    /// How long to wait for the branch lock in milliseconds (default 30000)
    pub lock_timeout_ms: Option<u64>,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(retries) = self.max_retries {
            if retries > MAX_RETRIES_LIMIT {
                return Err(ConfigError::InvalidValue(format!(
                    "sync.max_retries must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, retries
                )));
            }
        }
        if let (Some(initial), Some(max)) = (self.backoff_initial_ms, self.backoff_max_ms) {
            if initial > max {
                return Err(ConfigError::InvalidValue(format!(
                    "sync.backoff_initial_ms ({}) exceeds sync.backoff_max_ms ({})",
                    initial, max
                )));
            }
        }
        Ok(())
    }
}

/// Author/committer identity for synchronization commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommitConfig {
    /// Author and committer name
    pub author_name: Option<String>,

    /// Author and committer email
    pub author_email: Option<String>,
}

/// Where sync events are reported besides the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// Append one JSON line per event to this file
    pub events_file: Option<PathBuf>,
}
