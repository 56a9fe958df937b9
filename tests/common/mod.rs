//! Shared fixtures for integration tests.
//!
//! The aggregator is built with the `git` CLI in a non-bare scratch
//! repository and then cloned bare, which is how it is deployed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub const BACKEND_V0: &str = "a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0";
pub const BACKEND_V1: &str = "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
pub const BACKEND_V2: &str = "a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2";
pub const FRONTEND_V0: &str = "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0";
pub const FRONTEND_V1: &str = "f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1";
pub const ZERO: &str = "0000000000000000000000000000000000000000";

/// Run a git command in `dir`, returning trimmed stdout.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// A bare aggregator repository plus a config file pointing at it.
///
/// Tip of `main`:
///
/// ```text
/// backend            160000 BACKEND_V0
/// config.yaml        100644 blob
/// services/frontend  160000 FRONTEND_V0
/// services/README    100644 blob
/// ```
pub struct Aggregator {
    dir: TempDir,
}

impl Aggregator {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();

        run_git(&work, &["init", "-q"]);
        run_git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(&work, &["config", "user.email", "test@example.com"]);
        run_git(&work, &["config", "user.name", "Test User"]);

        std::fs::write(work.join("config.yaml"), "replicas: 3\n").unwrap();
        std::fs::create_dir(work.join("services")).unwrap();
        std::fs::write(work.join("services/README"), "services\n").unwrap();
        run_git(&work, &["add", "config.yaml", "services/README"]);
        for (hash, path) in [(BACKEND_V0, "backend"), (FRONTEND_V0, "services/frontend")] {
            let info = format!("160000,{},{}", hash, path);
            run_git(&work, &["update-index", "--add", "--cacheinfo", &info]);
        }
        run_git(&work, &["commit", "-q", "-m", "Initial aggregator"]);
        run_git(&work, &["branch", "develop"]);

        run_git(dir.path(), &["clone", "-q", "--bare", "work", "platform.git"]);

        let aggregator = Self { dir };
        aggregator.write_config("");
        aggregator
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The bare aggregator's git directory.
    pub fn git_dir(&self) -> PathBuf {
        self.dir.path().join("platform.git")
    }

    /// The non-bare scratch repository the aggregator was cloned from.
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("gitlink-sync.toml")
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.path().join("events.jsonl")
    }

    /// (Re)write the config file; `extra` is appended verbatim.
    pub fn write_config(&self, extra: &str) {
        let contents = format!(
            r#"[aggregator]
path = "platform.git"

[policy]
branch_allow_pattern = "^(main|develop)$"
repo_allow = ["backend", "frontend", "docs"]

[dependents]
backend = "backend"
frontend = "services/frontend"
docs = "docs"

[sync]
max_retries = 5
backoff_initial_ms = 1
backoff_max_ms = 8
lock_timeout_ms = 5000

[notify]
events_file = "events.jsonl"
{}"#,
            extra
        );
        std::fs::write(self.config_path(), contents).unwrap();
    }

    /// Run git against the bare repository.
    pub fn git(&self, args: &[&str]) -> String {
        run_git(&self.git_dir(), args)
    }

    pub fn tip(&self, branch: &str) -> String {
        self.git(&["rev-parse", &format!("refs/heads/{}", branch)])
    }

    /// Hash pinned at `path` on `branch`.
    pub fn pin(&self, branch: &str, path: &str) -> String {
        self.git(&["rev-parse", &format!("refs/heads/{}:{}", branch, path)])
    }

    /// Recursive `ls-tree` of a revision.
    pub fn ls_tree(&self, rev: &str) -> String {
        self.git(&["ls-tree", "-r", "--full-tree", rev])
    }

    /// Parents of a commit, in order.
    pub fn parents(&self, commit: &str) -> Vec<String> {
        self.git(&["rev-list", "--parents", "-n", "1", commit])
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    pub fn message(&self, commit: &str) -> String {
        self.git(&["log", "-1", "--format=%B", commit])
    }

    /// Lines of the JSONL events file (empty if never written).
    pub fn events(&self) -> Vec<serde_json::Value> {
        match std::fs::read_to_string(self.events_path()) {
            Ok(contents) => contents
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
