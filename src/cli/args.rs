//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Configuration file to use
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Only log warnings and errors

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitlink-sync - advance aggregator gitlinks when dependent repositories move
#[derive(Parser, Debug)]
#[command(name = "gitlink-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $GITLINK_SYNC_CONFIG, then the user config)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    ///
    /// Usage errors exit with status 1; `--help` and `--version` with 0.
    pub fn parse_args() -> Self {
        Self::try_parse().unwrap_or_else(|err| {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        })
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process push events from a git hook
    #[command(
        name = "hook",
        long_about = "Process push events from a git hook.\n\n\
            Reads one `<old> <new> <refname>` line per updated ref from stdin, the \
            protocol of the post-receive and pre-receive hooks. Each eligible line \
            advances the aggregator's gitlink for the source repository.",
        after_help = "\
INSTALLATION:
    # hooks/post-receive in each dependent repository
    #!/bin/sh
    exec gitlink-sync hook

SOURCE REPOSITORY:
    --source, else $GITLINK_SYNC_SOURCE, else the name of $GIT_DIR
    (with any .git suffix removed), else the current directory name."
    )]
    Hook {
        /// Identifier of the repository that was pushed to
        #[arg(long, env = "GITLINK_SYNC_SOURCE")]
        source: Option<String>,
    },

    /// Synchronize one push by hand
    #[command(
        name = "sync",
        after_help = "\
EXAMPLES:
    # Retry a failed synchronization
    gitlink-sync sync --source backend --ref refs/heads/main --new 4b825dc..."
    )]
    Sync {
        /// Identifier of the dependent repository
        #[arg(long)]
        source: String,

        /// Full ref name that was pushed
        #[arg(long = "ref", value_name = "REFNAME")]
        refname: String,

        /// New tip of the pushed branch
        #[arg(long, value_name = "OID")]
        new: String,

        /// Previous tip of the pushed branch
        #[arg(long, value_name = "OID")]
        old: Option<String>,
    },

    /// Show whether a push would be synchronized, without touching anything
    #[command(name = "check")]
    Check {
        /// Identifier of the dependent repository
        #[arg(long)]
        source: String,

        /// Full ref name
        #[arg(long = "ref", value_name = "REFNAME")]
        refname: String,
    },

    /// Print the resolved configuration
    #[command(name = "config")]
    Config {
        /// Print only the path of the configuration file
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    gitlink-sync completion bash >> ~/.bashrc
    gitlink-sync completion fish > ~/.config/fish/completions/gitlink-sync.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
