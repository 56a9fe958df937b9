//! sync::coordinator
//!
//! Synchronization coordinator: the single entry point that turns an
//! accepted push event into an advanced aggregator branch.
//!
//! # Lifecycle
//!
//! ```text
//! Filter -> Lock -> [Read tip -> Rewrite -> Build -> CAS]* -> Unlock -> Notify
//! ```
//!
//! The bracketed sequence is one attempt. When the compare-and-swap loses to
//! another writer the attempt restarts from a fresh read of the tip, never
//! from the stale tree, up to the configured number of retries.
//!
//! # Invariants
//!
//! - Only the ref advancer moves the branch, and only by compare-and-swap
//! - The branch lock is held from the first tip read through the last CAS
//! - Every request that passes the filter produces exactly one [`SyncEvent`]
//! - A failure before the CAS leaves the branch exactly where it was

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::advance::{reflog_message, RefAdvancer};
use super::commit::{sync_message, CommitBuilder};
use super::error::{ErrorKind, FailureCause, SyncError};
use super::filter::{Decision, EligibilityFilter, SyncRequest};
use super::notify::{Notifier, SyncEvent, SyncStatus};
use super::rewrite::TreeRewriter;
use crate::core::config::{Config, ConfigError};
use crate::core::ops::lock::BranchLock;
use crate::core::paths::SyncPaths;
use crate::core::types::{Oid, RefName};
use crate::git::{Git, GitError, Identity};

#[cfg(any(test, feature = "fault_injection"))]
use super::hooks;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff_initial: Duration,
    /// Ceiling for the delay
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Config::DEFAULT_MAX_RETRIES,
            backoff_initial: Duration::from_millis(Config::DEFAULT_BACKOFF_INITIAL_MS),
            backoff_max: Duration::from_millis(Config::DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Read the policy from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
        }
    }

    /// Delay before retry number `retry` (1-based): the initial delay
    /// doubled per retry, capped at the maximum.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_initial
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Result of a successful synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The branch was advanced.
    Synced {
        /// Aggregator tip the new commit is based on
        old: Oid,
        /// The published commit (new tip)
        new: Oid,
        /// Revision the gitlink pinned before
        previous_pin: Oid,
        /// Number of attempts it took
        attempts: u32,
    },
    /// The gitlink already pinned the requested revision.
    AlreadyCurrent {
        /// The unchanged aggregator tip
        tip: Oid,
    },
}

impl SyncOutcome {
    /// The aggregator tip after the operation.
    pub fn tip(&self) -> &Oid {
        match self {
            SyncOutcome::Synced { new, .. } => new,
            SyncOutcome::AlreadyCurrent { tip } => tip,
        }
    }
}

/// Errors building a coordinator.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration values could not be turned into a filter.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The aggregator repository could not be opened.
    #[error("cannot open aggregator repository: {0}")]
    Aggregator(#[from] GitError),
}

/// Per-line result of a hook invocation.
#[derive(Debug)]
pub struct LineReport {
    /// The input line
    pub line: String,
    /// What happened
    pub result: Result<SyncOutcome, SyncError>,
}

/// Results of processing every line of one hook invocation.
#[derive(Debug, Default)]
pub struct HookReport {
    /// One entry per non-blank input line, in input order
    pub lines: Vec<LineReport>,
}

impl HookReport {
    /// Number of lines that advanced the aggregator.
    pub fn synced(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l.result, Ok(SyncOutcome::Synced { .. })))
            .count()
    }

    /// Number of lines that failed with something other than a rejection.
    pub fn failures(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(&l.result, Err(e) if e.kind() != ErrorKind::Validation))
            .count()
    }

    /// Process exit code: the most severe line wins.
    pub fn exit_code(&self) -> u8 {
        self.lines
            .iter()
            .map(|l| match &l.result {
                Ok(_) => 0,
                Err(e) => e.exit_code(),
            })
            .max()
            .unwrap_or(0)
    }
}

/// What the current request has observed so far; feeds the event.
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    observed_tip: Option<Oid>,
    attempted: Option<Oid>,
}

/// Orchestrates filter, rewriter, builder and advancer for one aggregator.
pub struct Coordinator {
    git: Git,
    paths: SyncPaths,
    filter: EligibilityFilter,
    retry: RetryPolicy,
    lock_timeout: Duration,
    identity: Identity,
    notifier: Box<dyn Notifier>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("git", &self.git)
            .field("retry", &self.retry)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl Coordinator {
    /// Create a coordinator with default retry, lock and identity settings.
    ///
    /// The filter is narrowed to revisions as wide as the aggregator's
    /// object ids.
    pub fn new(git: Git, filter: EligibilityFilter, notifier: Box<dyn Notifier>) -> Self {
        let paths = SyncPaths::new(git.git_dir().to_path_buf());
        let filter = filter.with_revision_hex_len(git.oid_hex_len());
        Self {
            git,
            paths,
            filter,
            retry: RetryPolicy::default(),
            lock_timeout: Duration::from_millis(Config::DEFAULT_LOCK_TIMEOUT_MS),
            identity: Identity {
                name: "gitlink-sync".to_string(),
                email: "gitlink-sync@localhost".to_string(),
            },
            notifier,
        }
    }

    /// Open the configured aggregator and build a coordinator for it.
    pub fn from_config(config: &Config, notifier: Box<dyn Notifier>) -> Result<Self, SetupError> {
        let filter = EligibilityFilter::from_config(config)?;
        let git = Git::open(config.aggregator_path())?;
        Ok(Self::new(git, filter, notifier)
            .with_retry(RetryPolicy::from_config(config))
            .with_lock_timeout(config.lock_timeout())
            .with_identity(config.identity()))
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the branch lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the commit identity.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// The eligibility filter in use.
    pub fn filter(&self) -> &EligibilityFilter {
        &self.filter
    }

    /// The aggregator repository.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Filter one push event and synchronize it if eligible.
    ///
    /// Rejected events return [`SyncError::Validation`] without touching
    /// the aggregator or notifying.
    pub fn handle_event(
        &self,
        old: &str,
        new: &str,
        refname: &str,
        source: &str,
    ) -> Result<SyncOutcome, SyncError> {
        self.handle_decision(self.filter.evaluate(old, new, refname, source), refname, source)
    }

    /// Process every `old new ref` line of a hook invocation.
    ///
    /// Lines are handled in order; a failing line does not stop the rest.
    /// Blank lines are ignored.
    pub fn run_hook_lines<R: BufRead>(
        &self,
        input: R,
        source: &str,
    ) -> std::io::Result<HookReport> {
        let mut report = HookReport::default();
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let decision = self.filter.evaluate_line(&line, source);
            let result = self.handle_decision(decision, line.trim(), source);
            report.lines.push(LineReport { line, result });
        }
        Ok(report)
    }

    fn handle_decision(
        &self,
        decision: Decision,
        what: &str,
        source: &str,
    ) -> Result<SyncOutcome, SyncError> {
        match decision {
            Decision::Accept(request) => self.synchronize(&request),
            Decision::Reject(rejection) => {
                info!(source, input = what, reason = %rejection, "push not eligible; nothing to do");
                Err(SyncError::Validation(rejection))
            }
        }
    }

    /// Advance the aggregator branch so the request's gitlink pins its new
    /// revision.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] if the gitlink path is not in the tree
    /// - [`SyncError::SynchronizationFailed`] if retries are exhausted, the
    ///   lock times out, or the object store fails
    pub fn synchronize(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let span = info_span!(
            "sync",
            repo = %request.source,
            branch = %request.target_branch,
            path = %request.submodule_path,
        );
        let _enter = span.enter();

        let mut progress = Progress::default();
        let result = self.run_locked(request, &mut progress);

        match &result {
            Ok(SyncOutcome::Synced { new, attempts, .. }) => {
                info!(commit = %new.short(12), attempts, "aggregator advanced")
            }
            Ok(SyncOutcome::AlreadyCurrent { tip }) => {
                info!(tip = %tip.short(12), "gitlink already current")
            }
            Err(e) => error!(kind = %e.kind(), error = %e, "synchronization failed"),
        }

        self.notifier.notify(&event(request, &progress, &result));
        result
    }

    fn run_locked(
        &self,
        request: &SyncRequest,
        progress: &mut Progress,
    ) -> Result<SyncOutcome, SyncError> {
        let lock = BranchLock::acquire(&self.paths, &request.target_branch, self.lock_timeout)
            .map_err(|e| failed(request, progress, FailureCause::Lock(e)))?;
        debug!(
            path = %lock.path().display(),
            token = %lock.owner().token,
            "branch lock acquired"
        );

        let refname = RefName::for_branch(&request.target_branch);
        let rewriter = TreeRewriter::new(&self.git);
        let builder = CommitBuilder::new(&self.git, self.identity.clone());
        let advancer = RefAdvancer::new(&self.git);

        loop {
            progress.attempts += 1;
            debug!(attempt = progress.attempts, "reading aggregator tip");

            let tip = self
                .git
                .resolve_ref(refname.as_str())
                .map_err(|e| failed(request, progress, FailureCause::Store(e)))?;
            progress.observed_tip = Some(tip.clone());

            let rewrite = rewriter
                .rewrite(&tip, &request.submodule_path, &request.new_revision)
                .map_err(|e| escalate(request, progress, e))?;
            if rewrite.is_noop() {
                return Ok(SyncOutcome::AlreadyCurrent { tip });
            }

            let message = sync_message(request, rewrite.previous());
            let built = builder
                .build(&rewrite, &tip, &message)
                .map_err(|e| escalate(request, progress, e))?;
            progress.attempted = Some(built.commit.clone());

            #[cfg(any(test, feature = "fault_injection"))]
            hooks::invoke_before_advance(&hooks::AdvanceInfo {
                git_dir: self.git.git_dir().to_path_buf(),
                branch: request.target_branch.clone(),
                expected: tip.clone(),
                candidate: built.commit.clone(),
                attempt: progress.attempts,
            });

            let reflog = reflog_message(
                request.source.as_str(),
                request.submodule_path.as_str(),
                &tip,
                &built.commit,
            );
            match advancer.advance(&request.target_branch, &tip, &built.commit, &reflog) {
                Ok(()) => {
                    return Ok(SyncOutcome::Synced {
                        old: tip,
                        new: built.commit,
                        previous_pin: rewrite.previous().clone(),
                        attempts: progress.attempts,
                    });
                }
                Err(SyncError::ConcurrentUpdate { actual, .. }) => {
                    if progress.attempts > self.retry.max_retries {
                        return Err(failed(
                            request,
                            progress,
                            FailureCause::RetriesExhausted {
                                attempts: progress.attempts,
                            },
                        ));
                    }
                    let delay = self.retry.delay(progress.attempts);
                    let competing = Oid::new(&actual)
                        .ok()
                        .and_then(|oid| self.git.commit_info(&oid).ok());
                    warn!(
                        attempt = progress.attempts,
                        actual = %actual,
                        author = competing.as_ref().map_or("", |c| c.author_name.as_str()),
                        summary = competing.as_ref().map_or("", |c| c.summary.as_str()),
                        delay_ms = delay.as_millis() as u64,
                        "branch moved during synchronization; retrying"
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(escalate(request, progress, e)),
            }
        }
    }
}

/// Wrap a fatal cause with the request's context.
fn failed(request: &SyncRequest, progress: &Progress, cause: FailureCause) -> SyncError {
    SyncError::SynchronizationFailed {
        repo: request.source.clone(),
        branch: request.target_branch.clone(),
        path: request.submodule_path.clone(),
        revision: request.new_revision.clone(),
        observed_tip: progress.observed_tip.clone(),
        attempted: progress.attempted.clone(),
        cause,
    }
}

/// Give component failures the request's context; other errors pass through.
fn escalate(request: &SyncRequest, progress: &Progress, err: SyncError) -> SyncError {
    match err {
        SyncError::Component(cause) => failed(request, progress, cause),
        other => other,
    }
}

fn event(
    request: &SyncRequest,
    progress: &Progress,
    result: &Result<SyncOutcome, SyncError>,
) -> SyncEvent {
    let (status, new_hash, error) = match result {
        Ok(SyncOutcome::Synced { new, .. }) => (SyncStatus::Synced, Some(new.clone()), None),
        Ok(SyncOutcome::AlreadyCurrent { tip }) => {
            (SyncStatus::AlreadyCurrent, Some(tip.clone()), None)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            (SyncStatus::NotFound, None, Some(e.to_string()))
        }
        Err(e) => (SyncStatus::Failed, progress.attempted.clone(), Some(e.to_string())),
    };

    SyncEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        repo: request.source.clone(),
        branch: request.target_branch.clone(),
        path: request.submodule_path.clone(),
        revision: request.new_revision.clone(),
        old_hash: progress.observed_tip.clone(),
        new_hash,
        status,
        attempts: progress.attempts,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BranchName, GitlinkPath, RepoId};
    use crate::sync::filter::EligibilityPolicy;
    use crate::sync::notify::MemoryNotifier;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::process::Command;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const H0: &str = "a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0";
    const H1: &str = "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
    const F0: &str = "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0";
    const F1: &str = "f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1";

    fn run_git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("git command failed");
        if !output.status.success() {
            panic!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Aggregator with `backend` and `frontend` gitlinks and a config file.
    fn aggregator() -> TempDir {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path();
        run_git(path, &["init", "-q"]);
        run_git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(path, &["config", "user.email", "test@example.com"]);
        run_git(path, &["config", "user.name", "Test User"]);
        std::fs::write(path.join("config.yaml"), "replicas: 3\n").unwrap();
        run_git(path, &["add", "config.yaml"]);
        for (hash, name) in [(H0, "backend"), (F0, "frontend")] {
            let info = format!("160000,{},{}", hash, name);
            run_git(path, &["update-index", "--add", "--cacheinfo", &info]);
        }
        run_git(path, &["commit", "-q", "-m", "Initial aggregator"]);
        dir
    }

    fn filter() -> EligibilityFilter {
        let policy = EligibilityPolicy::new(
            "^(main|develop)$",
            ["backend", "frontend"].map(|id| RepoId::new(id).unwrap()),
        )
        .unwrap();
        let mut mappings = BTreeMap::new();
        for id in ["backend", "frontend"] {
            mappings.insert(RepoId::new(id).unwrap(), GitlinkPath::new(id).unwrap());
        }
        EligibilityFilter::new(policy, mappings, None)
    }

    fn coordinator(dir: &Path, notifier: &MemoryNotifier) -> Coordinator {
        Coordinator::new(
            Git::open(dir).unwrap(),
            filter(),
            Box::new(notifier.clone()),
        )
        .with_retry(RetryPolicy {
            max_retries: 2,
            backoff_initial: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
        })
    }

    fn request(repo: &str, new: &str) -> SyncRequest {
        SyncRequest {
            source: RepoId::new(repo).unwrap(),
            branch: BranchName::new("main").unwrap(),
            target_branch: BranchName::new("main").unwrap(),
            submodule_path: GitlinkPath::new(repo).unwrap(),
            old_revision: Oid::zero(),
            new_revision: Oid::new(new).unwrap(),
        }
    }

    fn pin(dir: &Path, path: &str) -> String {
        let spec = format!("refs/heads/main:{}", path);
        run_git(dir, &["rev-parse", &spec])
    }

    fn tip(dir: &Path) -> String {
        run_git(dir, &["rev-parse", "refs/heads/main"])
    }

    /// Commit on top of the tip without changing the tree.
    fn move_branch_out_of_band(git_dir: &Path) {
        let git_dir = git_dir.to_str().unwrap();
        let tip = run_git(Path::new("."), &["--git-dir", git_dir, "rev-parse", "refs/heads/main"]);
        let tree = format!("{}^{{tree}}", tip);
        let commit = run_git(
            Path::new("."),
            &["--git-dir", git_dir, "commit-tree", &tree, "-p", &tip, "-m", "oob"],
        );
        run_git(
            Path::new("."),
            &["--git-dir", git_dir, "update-ref", "refs/heads/main", &commit, &tip],
        );
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(5), Duration::from_millis(800));
        assert_eq!(policy.delay(6), Duration::from_millis(1000));
        assert_eq!(policy.delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn synchronize_advances_branch() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);
        let before = tip(dir.path());

        let outcome = coordinator.synchronize(&request("backend", H1)).unwrap();
        match &outcome {
            SyncOutcome::Synced {
                old,
                previous_pin,
                attempts,
                ..
            } => {
                assert_eq!(old.as_str(), before);
                assert_eq!(previous_pin.as_str(), H0);
                assert_eq!(*attempts, 1);
            }
            other => panic!("expected Synced, got {:?}", other),
        }
        assert_eq!(tip(dir.path()), outcome.tip().as_str());
        assert_eq!(pin(dir.path(), "backend"), H1);
        assert_eq!(pin(dir.path(), "frontend"), F0);

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, SyncStatus::Synced);
        assert_eq!(events[0].old_hash.as_ref().unwrap().as_str(), before);
    }

    #[test]
    fn redelivery_is_already_current() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        coordinator.synchronize(&request("backend", H1)).unwrap();
        let after_first = tip(dir.path());
        let outcome = coordinator.synchronize(&request("backend", H1)).unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::AlreadyCurrent {
                tip: Oid::new(after_first.clone()).unwrap()
            }
        );
        assert_eq!(tip(dir.path()), after_first);
        assert_eq!(notifier.events()[1].status, SyncStatus::AlreadyCurrent);
    }

    #[test]
    fn retries_after_concurrent_update() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        hooks::set_before_advance(|info| {
            if info.attempt == 1 {
                move_branch_out_of_band(&info.git_dir);
            }
        });
        let result = coordinator.synchronize(&request("backend", H1));
        hooks::clear();

        match result.unwrap() {
            SyncOutcome::Synced { attempts, old, new, .. } => {
                assert_eq!(attempts, 2);
                let parents = coordinator.git().commit_parents(&new).unwrap();
                assert_eq!(parents, vec![old.clone()]);
                // The retry was based on the out-of-band commit.
                let oob_parent = coordinator.git().commit_parents(&old).unwrap();
                assert_eq!(oob_parent.len(), 1);
            }
            other => panic!("expected Synced, got {:?}", other),
        }
        assert_eq!(pin(dir.path(), "backend"), H1);
        assert_eq!(notifier.events()[0].attempts, 2);
    }

    #[test]
    fn concurrent_writer_update_is_not_lost() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        // Writer B pins frontend while we are between build and CAS.
        hooks::set_before_advance(|info| {
            if info.attempt != 1 {
                return;
            }
            let git = Git::open(&info.git_dir).unwrap();
            let path = GitlinkPath::new("frontend").unwrap();
            let f1 = Oid::new(F1).unwrap();
            let rewrite = TreeRewriter::new(&git)
                .rewrite(&info.expected, &path, &f1)
                .unwrap();
            let identity = Identity {
                name: "writer-b".into(),
                email: "b@example.com".into(),
            };
            let built = CommitBuilder::new(&git, identity)
                .build(&rewrite, &info.expected, "Update frontend")
                .unwrap();
            git.update_ref_cas("refs/heads/main", &built.commit, &info.expected, "writer b")
                .unwrap();
        });
        let result = coordinator.synchronize(&request("backend", H1));
        hooks::clear();

        assert!(matches!(result, Ok(SyncOutcome::Synced { attempts: 2, .. })));
        assert_eq!(pin(dir.path(), "backend"), H1);
        assert_eq!(pin(dir.path(), "frontend"), F1);
    }

    #[test]
    fn exhausted_retries_fail_without_overwrite() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_hook = calls.clone();

        hooks::set_before_advance(move |info| {
            calls_hook.fetch_add(1, Ordering::SeqCst);
            move_branch_out_of_band(&info.git_dir);
        });
        let result = coordinator.synchronize(&request("backend", H1));
        hooks::clear();

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynchronizationFailed);
        assert!(matches!(
            err,
            SyncError::SynchronizationFailed {
                cause: FailureCause::RetriesExhausted { attempts: 3 },
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The last out-of-band commit stands; ours never landed.
        assert_eq!(pin(dir.path(), "backend"), H0);
        let last_attempt = err.attempted().unwrap().clone();
        assert_ne!(tip(dir.path()), last_attempt.as_str());

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, SyncStatus::Failed);
        assert_eq!(events[0].new_hash.as_ref(), Some(&last_attempt));
    }

    #[test]
    fn missing_path_is_fatal_and_leaves_branch() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);
        let before = tip(dir.path());

        let mut req = request("backend", H1);
        req.submodule_path = GitlinkPath::new("payments").unwrap();
        let err = coordinator.synchronize(&req).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(tip(dir.path()), before);
        assert_eq!(notifier.events()[0].status, SyncStatus::NotFound);
    }

    #[test]
    fn blob_at_path_is_not_found() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        let mut req = request("backend", H1);
        req.submodule_path = GitlinkPath::new("config.yaml").unwrap();
        let err = coordinator.synchronize(&req).unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert!(err.to_string().contains("not a gitlink"));
    }

    #[test]
    fn lock_timeout_is_fatal() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier).with_lock_timeout(Duration::ZERO);
        let paths = SyncPaths::new(coordinator.git().git_dir().to_path_buf());
        let _held = BranchLock::acquire(&paths, &BranchName::new("main").unwrap(), Duration::ZERO)
            .unwrap();

        let before = tip(dir.path());
        let err = coordinator.synchronize(&request("backend", H1)).unwrap_err();
        assert!(matches!(
            err,
            SyncError::SynchronizationFailed {
                cause: FailureCause::Lock(_),
                ..
            }
        ));
        assert_eq!(tip(dir.path()), before);
        assert_eq!(notifier.events()[0].status, SyncStatus::Failed);
    }

    #[test]
    fn missing_branch_is_fatal() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        let mut req = request("backend", H1);
        req.target_branch = BranchName::new("develop").unwrap();
        let err = coordinator.synchronize(&req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynchronizationFailed);
        assert!(err.observed_tip().is_none());
    }

    #[test]
    fn rejected_events_do_not_notify() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);
        let before = tip(dir.path());

        let err = coordinator
            .handle_event(H0, H1, "refs/heads/feature-x", "backend")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.exit_code(), 0);
        assert!(notifier.events().is_empty());
        assert_eq!(tip(dir.path()), before);
    }

    #[test]
    fn hook_lines_processed_independently() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        let input = format!(
            "{old} {new} refs/heads/feature\n\
             \n\
             garbage\n\
             {old} {new} refs/heads/main\n",
            old = H0,
            new = H1
        );
        let report = coordinator
            .run_hook_lines(input.as_bytes(), "backend")
            .unwrap();

        assert_eq!(report.lines.len(), 3);
        assert_eq!(report.synced(), 1);
        assert_eq!(report.failures(), 0);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(pin(dir.path(), "backend"), H1);
    }

    #[test]
    fn hook_report_exit_code_is_most_severe() {
        let dir = aggregator();
        let notifier = MemoryNotifier::new();
        let coordinator = coordinator(dir.path(), &notifier);

        let mut mappings = BTreeMap::new();
        mappings.insert(
            RepoId::new("backend").unwrap(),
            GitlinkPath::new("nowhere").unwrap(),
        );
        let policy =
            EligibilityPolicy::new("^main$", [RepoId::new("backend").unwrap()]).unwrap();
        let coordinator = Coordinator {
            filter: EligibilityFilter::new(policy, mappings, None),
            ..coordinator
        };

        let input = format!("{} {} refs/heads/main\n", H0, H1);
        let report = coordinator
            .run_hook_lines(input.as_bytes(), "backend")
            .unwrap();
        assert_eq!(report.failures(), 1);
        assert_eq!(report.exit_code(), 2);
    }
}
