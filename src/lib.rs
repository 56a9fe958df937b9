//! gitlink-sync - Keep an aggregator repository's gitlinks in step with its components
//!
//! Installed as a push hook on component repositories, gitlink-sync moves
//! the matching gitlink in an aggregator ("superproject") repository to the
//! newly pushed commit. It writes trees and commits straight into the
//! aggregator's object store and advances the branch with a
//! compare-and-swap, so there is no working tree and no pull/commit/push
//! race.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to sync)
//! - [`sync`] - Eligibility filter, tree rewrite, commit build, ref advance, coordinator
//! - [`core`] - Domain types, configuration, and the branch lock
//! - [`git`] - Single interface for all Git object store operations
//!
//! # Correctness Invariants
//!
//! 1. Only the target gitlink entry changes; every other entry is byte-identical
//! 2. A branch only moves by compare-and-swap from the tip the commit was built on
//! 3. Concurrent updates are never lost; a lost race rebuilds on the new tip
//! 4. Redelivering an event that is already applied is a no-op

pub mod cli;
pub mod core;
pub mod git;
pub mod sync;
