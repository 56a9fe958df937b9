//! sync::notify
//!
//! Structured events reported after every synchronization attempt.
//!
//! Notification is purely informational. A notifier cannot fail an attempt:
//! [`Notifier::notify`] returns nothing, and implementations that do I/O
//! log their own failures.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::types::{BranchName, GitlinkPath, Oid, RepoId};

/// Final status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// The branch was advanced.
    Synced,
    /// The gitlink already pinned the revision; nothing was written.
    AlreadyCurrent,
    /// The gitlink path is not registered in the aggregator.
    NotFound,
    /// The attempt was abandoned.
    Failed,
}

impl SyncStatus {
    /// The serialized name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::AlreadyCurrent => "already-current",
            SyncStatus::NotFound => "not-found",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synchronization attempt, as reported to notifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Unique id of this event
    pub id: Uuid,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Dependent repository that triggered the attempt
    pub repo: RepoId,
    /// Aggregator branch
    pub branch: BranchName,
    /// Gitlink path
    pub path: GitlinkPath,
    /// Dependent revision requested
    pub revision: Oid,
    /// Aggregator tip before the attempt, if it was read
    pub old_hash: Option<Oid>,
    /// Aggregator tip after a successful attempt, or the commit that failed
    /// to publish
    pub new_hash: Option<Oid>,
    /// Outcome
    pub status: SyncStatus,
    /// Number of compare-and-swap attempts made
    pub attempts: u32,
    /// Error message for unsuccessful attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receives sync events.
pub trait Notifier {
    /// Report one event.
    fn notify(&self, event: &SyncEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &SyncEvent) {
        let old = event.old_hash.as_ref().map(|o| o.short(12)).unwrap_or("-");
        let new = event.new_hash.as_ref().map(|o| o.short(12)).unwrap_or("-");
        match event.status {
            SyncStatus::Synced | SyncStatus::AlreadyCurrent => info!(
                repo = %event.repo,
                branch = %event.branch,
                path = %event.path,
                old_hash = old,
                new_hash = new,
                status = %event.status,
                attempts = event.attempts,
                "sync event"
            ),
            SyncStatus::NotFound | SyncStatus::Failed => warn!(
                repo = %event.repo,
                branch = %event.branch,
                path = %event.path,
                old_hash = old,
                new_hash = new,
                status = %event.status,
                attempts = event.attempts,
                error = event.error.as_deref().unwrap_or(""),
                "sync event"
            ),
        }
    }
}

/// Appends one JSON document per line to a file.
#[derive(Debug, Clone)]
pub struct JsonlNotifier {
    path: PathBuf,
}

impl JsonlNotifier {
    /// Create a notifier appending to `path`. The file and its parent
    /// directory are created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The events file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &SyncEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl Notifier for JsonlNotifier {
    fn notify(&self, event: &SyncEvent) {
        if let Err(e) = self.append(event) {
            warn!(path = %self.path.display(), error = %e, "failed to record sync event");
        }
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl MemoryNotifier {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far, in order.
    pub fn events(&self) -> Vec<SyncEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, event: &SyncEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards every event to each inner notifier in turn.
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<Box<dyn Notifier + Send + Sync>>,
}

impl FanoutNotifier {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// The notifiers a configuration asks for: the log always, plus the
    /// events file when one is set.
    pub fn from_config(config: &Config) -> Self {
        let fanout = Self::new().with(TracingNotifier);
        match config.events_file() {
            Some(path) => fanout.with(JsonlNotifier::new(path)),
            None => fanout,
        }
    }

    /// Add a target.
    pub fn with(mut self, notifier: impl Notifier + Send + Sync + 'static) -> Self {
        self.targets.push(Box::new(notifier));
        self
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: &SyncEvent) {
        for target in &self.targets {
            target.notify(event);
        }
    }
}
