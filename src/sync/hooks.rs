//! sync::hooks
//!
//! Test-only hooks for fault injection.
//!
//! The `before_advance` hook fires after a commit has been built and before
//! the ref advancer's compare-and-swap. Moving the branch from inside the
//! hook reproduces a concurrent writer landing exactly in the race window,
//! which exercises the coordinator's retry and exhaustion paths.
//!
//! # Usage
//!
//! ```ignore
//! use gitlink_sync::sync::hooks;
//!
//! hooks::set_before_advance(|info| {
//!     // move refs/heads/<info.branch> out of band
//! });
//! let result = coordinator.synchronize(&request);
//! hooks::clear();
//! ```
//!
//! # Thread Safety
//!
//! Hooks live in thread-local storage, so concurrent tests do not see each
//! other's hooks. Each test must call [`clear`] when done.
//!
//! Only compiled under `cfg(test)` or the `fault_injection` feature.

use std::cell::RefCell;
use std::path::PathBuf;

use crate::core::types::{BranchName, Oid};

/// What the coordinator is about to publish.
#[derive(Debug, Clone)]
pub struct AdvanceInfo {
    /// Aggregator git directory
    pub git_dir: PathBuf,
    /// Aggregator branch
    pub branch: BranchName,
    /// Tip the attempt was based on
    pub expected: Oid,
    /// Commit about to be published
    pub candidate: Oid,
    /// 1-based attempt number
    pub attempt: u32,
}

type AdvanceHook = Box<dyn Fn(&AdvanceInfo) + Send + Sync>;

/// Registered hooks. Unset fields do nothing.
#[derive(Default)]
struct SyncHooks {
    before_advance: Option<AdvanceHook>,
}

thread_local! {
    static HOOKS: RefCell<Option<SyncHooks>> = const { RefCell::new(None) };
}

/// Run `f` before every compare-and-swap on this thread.
pub fn set_before_advance<F>(f: F)
where
    F: Fn(&AdvanceInfo) + Send + Sync + 'static,
{
    HOOKS.with(|h| {
        h.borrow_mut()
            .get_or_insert_with(SyncHooks::default)
            .before_advance = Some(Box::new(f));
    });
}

/// Remove all hooks on this thread.
pub fn clear() {
    HOOKS.with(|h| *h.borrow_mut() = None);
}

/// Invoke the `before_advance` hook, if set.
pub(crate) fn invoke_before_advance(info: &AdvanceInfo) {
    HOOKS.with(|h| {
        if let Some(hooks) = h.borrow().as_ref() {
            if let Some(f) = &hooks.before_advance {
                f(info);
            }
        }
    });
}
