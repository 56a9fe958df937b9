//! core::ops::lock
//!
//! Exclusive per-branch lock for synchronization attempts.
//!
//! # Architecture
//!
//! The branch lock is the critical section that serializes synchronization
//! attempts targeting the same aggregator branch. Hooks for different
//! dependent repositories run as independent processes, so the lock is an
//! OS-level file lock (via `fs2`) that works across processes.
//!
//! Correctness does not depend on the lock: the ref update itself is a
//! compare-and-swap. The lock keeps contending writers from wasting work on
//! commits that are bound to lose the race.
//!
//! # Storage
//!
//! - `<git_dir>/gitlink-sync/locks/<branch>.lock` - lock file holding a JSON
//!   owner record (owner, pid, token, acquired_at) for diagnostics
//!
//! # Invariants
//!
//! - Lock must be held from reading the tip through the ref update
//! - Lock is automatically released on drop (RAII pattern)
//! - Acquisition waits at most the configured timeout, then fails loudly
//!
//! # Example
//!
//! ```ignore
//! use gitlink_sync::core::ops::lock::BranchLock;
//! use std::time::Duration;
//!
//! let lock = BranchLock::acquire(&paths, &branch, Duration::from_secs(30))?;
//! // read tip, rewrite, commit, CAS
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::core::paths::SyncPaths;
use crate::core::types::BranchName;

/// First delay between acquisition attempts.
const POLL_INITIAL: Duration = Duration::from_millis(5);
/// Longest delay between acquisition attempts.
const POLL_MAX: Duration = Duration::from_millis(100);

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process held the lock for the whole timeout.
    #[error("timed out after {waited:?} waiting for lock {}{}", .path.display(), describe_holder(.holder))]
    Timeout {
        /// The lock file
        path: PathBuf,
        /// How long we waited
        waited: Duration,
        /// The recorded holder, if readable
        holder: Option<LockOwner>,
    },

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

fn describe_holder(holder: &Option<LockOwner>) -> String {
    match holder {
        Some(owner) => format!(
            " (held by {} since {})",
            owner.owner,
            owner.acquired_at.to_rfc3339()
        ),
        None => String::new(),
    }
}

/// Owner record written into a held lock file.
///
/// Used only to report who is holding a lock when acquisition times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    /// `pid@host` of the holder
    pub owner: String,
    /// Process id of the holder
    pub pid: u32,
    /// Unique token for this acquisition
    pub token: Uuid,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    /// Record for the current process.
    fn current() -> Self {
        let pid = std::process::id();
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self {
            owner: format!("{}@{}", pid, host),
            pid,
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
        }
    }

    /// Read the owner record from a lock file, if present and well-formed.
    pub fn read(path: &Path) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str(contents.trim()).ok()
    }
}

/// An exclusive lock on one aggregator branch.
///
/// The lock is automatically released when this guard is dropped.
#[derive(Debug)]
pub struct BranchLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    file: File,
    /// The record we wrote.
    owner: LockOwner,
}

impl BranchLock {
    /// Acquire the lock for `branch`, waiting up to `timeout`.
    ///
    /// Polls with a growing delay (5 ms doubling to 100 ms) until the lock
    /// is free or the deadline passes.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if the lock stayed held for the whole timeout
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(
        paths: &SyncPaths,
        branch: &BranchName,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let (path, file) = Self::open(paths, branch)?;
        let deadline = Instant::now() + timeout;
        let mut delay = POLL_INITIAL;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Self::held(path, file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        let holder = LockOwner::read(&path);
                        return Err(LockError::Timeout {
                            path,
                            waited: timeout,
                            holder,
                        });
                    }
                    std::thread::sleep(delay.min(deadline - now));
                    delay = (delay * 2).min(POLL_MAX);
                }
                Err(e) => return Err(LockError::AcquireFailed(e.to_string())),
            }
        }
    }

    fn open(paths: &SyncPaths, branch: &BranchName) -> Result<(PathBuf, File), LockError> {
        let dir = paths.locks_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = paths.branch_lock_path(branch);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;
        Ok((path, file))
    }

    /// Wrap a locked file and record ourselves as owner.
    fn held(path: PathBuf, mut file: File) -> Result<Self, LockError> {
        let owner = LockOwner::current();
        let record = serde_json::to_string(&owner)
            .map_err(|e| LockError::AcquireFailed(e.to_string()))?;

        // The record is advisory; a failed write still leaves us holding the lock.
        if let Err(e) = write_record(&mut file, &record) {
            warn!(path = %path.display(), error = %e, "failed to write lock owner record");
        }

        Ok(Self { path, file, owner })
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The owner record written for this acquisition.
    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }
}

fn write_record(file: &mut File, record: &str) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", record)?;
    file.flush()
}

impl Drop for BranchLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
    }
}
