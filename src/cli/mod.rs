//! cli
//!
//! Command-line interface layer for gitlink-sync.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Load configuration once and hand it to the command handlers
//!
//! # Exit Status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | synchronized, already current, or not eligible |
//! | 1 | configuration or usage error |
//! | 2 | gitlink path not registered in the aggregator |
//! | 3 | synchronization failed (retries, lock timeout, store) |

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::core::config::Config;

/// Settings shared by every command handler.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Explicit configuration file from `--config`
    pub config_path: Option<PathBuf>,
    /// Debug logging requested
    pub debug: bool,
    /// Minimal output requested
    pub quiet: bool,
}

impl Context {
    /// Load and validate the configuration.
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.config_path.as_deref()).context("failed to load configuration")
    }
}

/// Run the CLI application and return the process exit code.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<u8> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug, cli.quiet);

    let ctx = Context {
        config_path: cli.config.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` is honoured unless `--debug` or `--quiet` pins the level.
pub fn init_tracing(debug: bool, quiet: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
