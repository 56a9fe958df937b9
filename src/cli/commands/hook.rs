//! hook command - Process `<old> <new> <ref>` lines from a git hook

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::debug;

use crate::cli::commands::describe;
use crate::cli::Context;
use crate::core::types::RepoId;
use crate::sync::notify::FanoutNotifier;
use crate::sync::Coordinator;

/// Run as a post-receive / pre-receive hook, reading stdin.
pub fn hook(ctx: &Context, source: Option<&str>) -> Result<u8> {
    let config = ctx.load_config()?;
    let source = match source {
        Some(source) => source.to_string(),
        None => detect_source()?,
    };
    debug!(source = %source, "processing hook input");

    let coordinator =
        Coordinator::from_config(&config, Box::new(FanoutNotifier::from_config(&config)))?;

    let stdin = std::io::stdin();
    let report = coordinator
        .run_hook_lines(stdin.lock(), &source)
        .context("failed to read hook input")?;

    if !ctx.quiet {
        for line in &report.lines {
            println!("gitlink-sync: {}: {}", source, describe(&line.result));
        }
    }

    Ok(report.exit_code())
}

/// Source repository when `--source` and `$GITLINK_SYNC_SOURCE` are unset:
/// `$GIT_DIR` if git set it, else the current directory.
fn detect_source() -> Result<String> {
    let dir = match std::env::var_os("GIT_DIR") {
        Some(git_dir) => PathBuf::from(git_dir),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    Ok(source_from_dir(&dir))
}

/// Derive a source identifier from a repository directory.
///
/// Relative paths (git passes `GIT_DIR=.` to hooks in bare repositories)
/// are resolved first. A directory without a usable name is returned as-is
/// so the eligibility filter rejects it.
pub fn source_from_dir(dir: &Path) -> String {
    let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    match RepoId::from_repo_path(&resolved) {
        Ok(id) => id.to_string(),
        Err(_) => resolved.display().to_string(),
    }
}
