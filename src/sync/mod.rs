//! sync
//!
//! The synchronization core: a push on a dependent repository advances the
//! aggregator's gitlink pin.
//!
//! # Components
//!
//! Leaves first:
//!
//! - [`filter`] - eligibility of a push event (pure)
//! - [`rewrite`] - retargets one gitlink in the aggregator tree
//! - [`commit`] - writes the rewritten trees and a single-parent commit
//! - [`advance`] - publishes the commit by compare-and-swap
//! - [`coordinator`] - runs the above under the branch lock with bounded retry
//!
//! [`notify`] reports one structured event per attempt.

pub mod advance;
pub mod commit;
pub mod coordinator;
pub mod error;
pub mod filter;
#[cfg(any(test, feature = "fault_injection"))]
pub mod hooks;
pub mod notify;
pub mod rewrite;

pub use coordinator::{Coordinator, HookReport, RetryPolicy, SyncOutcome};
pub use error::{ErrorKind, FailureCause, SyncError};
pub use filter::{Decision, EligibilityFilter, EligibilityPolicy, Rejection, Route, SyncRequest};
pub use notify::{Notifier, SyncEvent, SyncStatus};
