//! core::ops
//!
//! Cross-process coordination primitives.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive per-branch lock (the critical section)
//!
//! # Architecture
//!
//! Every synchronization attempt:
//! 1. Acquires the branch lock for the aggregator branch it targets
//! 2. Reads the tip, rewrites the tree and builds a commit
//! 3. Advances the branch with compare-and-swap
//! 4. Releases the lock (on drop)

pub mod lock;
