//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads configuration through the [`Context`]
//! 2. Calls into [`crate::sync`] to do the work
//! 3. Formats and displays output, returning the exit code
//!
//! Handlers never touch the aggregator repository themselves.

mod check;
mod completion;
mod config_cmd;
mod hook;
mod sync;

// Re-export command functions for testing and direct invocation
pub use check::check;
pub use completion::completion;
pub use config_cmd::config;
pub use hook::{hook, source_from_dir};
pub use sync::sync;

use crate::cli::args::Command;
use crate::cli::Context;
use crate::sync::{SyncError, SyncOutcome};
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<u8> {
    match command {
        Command::Hook { source } => hook(ctx, source.as_deref()),
        Command::Sync {
            source,
            refname,
            new,
            old,
        } => sync(ctx, &source, &refname, &new, old.as_deref()),
        Command::Check { source, refname } => check(ctx, &source, &refname),
        Command::Config { path } => config(ctx, path),
        Command::Completion { shell } => completion(shell),
    }
}

/// One-line, human-readable summary of a synchronization result.
pub(crate) fn describe(result: &Result<SyncOutcome, SyncError>) -> String {
    match result {
        Ok(SyncOutcome::Synced {
            old,
            new,
            attempts,
            ..
        }) => {
            let retries = match *attempts {
                1 => String::new(),
                n => format!(" after {} attempts", n),
            };
            format!("synced {}..{}{}", old.short(12), new.short(12), retries)
        }
        Ok(SyncOutcome::AlreadyCurrent { tip }) => {
            format!("already current at {}", tip.short(12))
        }
        Err(SyncError::Validation(rejection)) => format!("skipped: {}", rejection),
        Err(e) => format!("error: {}", e),
    }
}
