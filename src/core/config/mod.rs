//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Configuration is a static TOML document loaded once at process start and
//! passed down explicitly. The synchronization logic never reads files or
//! environment variables itself.
//!
//! # Locations
//!
//! Searched in order:
//! 1. An explicit path (the `--config` flag)
//! 2. `$GITLINK_SYNC_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/gitlink-sync/config.toml`
//! 4. `~/.gitlink-sync/config.toml`
//!
//! A missing document is an error: without an allow-list nothing can be
//! synchronized, and the hook must fail closed.
//!
//! # Example
//!
//! ```no_run
//! use gitlink_sync::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("aggregator: {}", config.aggregator_path().display());
//! println!("retries: {}", config.max_retries());
//! ```

pub mod schema;

pub use schema::{
    AggregatorConfig, CommitConfig, NotifyConfig, PolicyConfig, RetryConfig, SyncConfig,
};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::git::Identity;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GITLINK_SYNC_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found (searched: {})", format_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loaded and validated configuration.
///
/// Accessor methods apply defaults, so callers never deal with `Option`s
/// for tunables.
#[derive(Debug, Clone)]
pub struct Config {
    /// The parsed document, with relative paths already resolved
    pub file: SyncConfig,
    /// Path the document was loaded from (None when built from a string)
    source_path: Option<PathBuf>,
}

impl Config {
    /// Default number of retries after a concurrent update.
    pub const DEFAULT_MAX_RETRIES: u32 = 5;
    /// Default first backoff delay.
    pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 50;
    /// Default backoff ceiling.
    pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1000;
    /// Default branch lock timeout.
    pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

    /// Locate, read, parse and validate the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if no candidate file exists
    /// - [`ConfigError::ParseError`] if the document is malformed
    /// - [`ConfigError::InvalidValue`] if validation fails
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::locate(explicit)?;
        Self::from_file(&path)
    }

    /// Find the config file to use.
    fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ConfigError::NotFound {
                searched: vec![path.to_path_buf()],
            });
        }

        let candidates = Self::candidate_paths();
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Ok(path.clone()),
            None => Err(ConfigError::NotFound {
                searched: candidates,
            }),
        }
    }

    /// Candidate locations, in search order.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("gitlink-sync/config.toml"));
        }
        if let Ok(path) = Self::home_config_path() {
            candidates.push(path);
        }
        candidates
    }

    /// The per-user config location, `~/.gitlink-sync/config.toml`.
    pub fn home_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".gitlink-sync/config.toml"))
    }

    /// Read a specific config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: SyncConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self {
            file,
            source_path: Some(path.to_path_buf()),
        };
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.file.validate()?;
        Ok(config)
    }

    /// Parse a config document from a string.
    ///
    /// Relative paths resolve against `base_dir` when given.
    pub fn from_toml_str(contents: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let file: SyncConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;

        let mut config = Self {
            file,
            source_path: None,
        };
        if let Some(base) = base_dir {
            config.resolve_relative_paths(base);
        }
        config.file.validate()?;
        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        if self.file.aggregator.path.is_relative() {
            self.file.aggregator.path = base.join(&self.file.aggregator.path);
        }
        if let Some(events) = self.file.notify.events_file.as_mut() {
            if events.is_relative() {
                *events = base.join(&*events);
            }
        }
    }

    /// Render the effective document as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(&self.file).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Path the configuration was loaded from.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Location of the aggregator repository.
    pub fn aggregator_path(&self) -> &Path {
        &self.file.aggregator.path
    }

    /// Configured aggregator branch, if fixed.
    pub fn aggregator_branch(&self) -> Option<&str> {
        self.file.aggregator.branch.as_deref()
    }

    /// Branch eligibility pattern.
    ///
    /// Defaults to `^(main|develop)$`.
    pub fn branch_allow_pattern(&self) -> &str {
        self.file
            .policy
            .branch_allow_pattern
            .as_deref()
            .unwrap_or(PolicyConfig::DEFAULT_BRANCH_PATTERN)
    }

    /// Allow-listed dependent repository ids.
    pub fn repo_allow(&self) -> &[String] {
        &self.file.policy.repo_allow
    }

    /// Mapping from dependent repository id to gitlink path.
    pub fn dependents(&self) -> &BTreeMap<String, String> {
        &self.file.dependents
    }

    /// Retries after a concurrent update.
    ///
    /// Defaults to 5.
    pub fn max_retries(&self) -> u32 {
        self.file
            .sync
            .max_retries
            .unwrap_or(Self::DEFAULT_MAX_RETRIES)
    }

    /// First backoff delay.
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(
            self.file
                .sync
                .backoff_initial_ms
                .unwrap_or(Self::DEFAULT_BACKOFF_INITIAL_MS),
        )
    }

    /// Backoff ceiling (never below the initial delay).
    pub fn backoff_max(&self) -> Duration {
        let max = Duration::from_millis(
            self.file
                .sync
                .backoff_max_ms
                .unwrap_or(Self::DEFAULT_BACKOFF_MAX_MS),
        );
        max.max(self.backoff_initial())
    }

    /// How long to wait for the branch lock.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(
            self.file
                .sync
                .lock_timeout_ms
                .unwrap_or(Self::DEFAULT_LOCK_TIMEOUT_MS),
        )
    }

    /// Author and committer of synchronization commits.
    pub fn identity(&self) -> Identity {
        Identity {
            name: self
                .file
                .commit
                .author_name
                .clone()
                .unwrap_or_else(|| "gitlink-sync".to_string()),
            email: self
                .file
                .commit
                .author_email
                .clone()
                .unwrap_or_else(|| "gitlink-sync@localhost".to_string()),
        }
    }

    /// File receiving JSON-line events, if configured.
    pub fn events_file(&self) -> Option<&Path> {
        self.file.notify.events_file.as_deref()
    }
}
