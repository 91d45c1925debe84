//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DevFlow - git worktree lifecycle orchestrator
#[derive(Parser)]
#[command(
    name = "wt",
    about = "Git worktree lifecycle orchestrator for parallel feature work",
    version,
    after_help = "Logs are written to: ~/.local/share/devflow/logs/devflow.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Create a worktree on a new branch under the worktrees directory
    New {
        /// Branch name
        branch: String,

        /// Parent branch to fork from (recorded for later merges)
        parent: Option<String>,
    },

    /// List worktrees with branch, issue, and nesting information
    List,

    /// Merge a branch into its parent with backup and cleanup
    Merge {
        /// Branch name to merge
        branch: String,

        /// Skip worktree and branch cleanup after merge
        #[arg(long)]
        no_cleanup: bool,

        /// Skip pushing changes to remote
        #[arg(long)]
        no_push: bool,

        /// Preview changes before merge
        #[arg(long)]
        preview: bool,
    },

    /// Clean up branches already merged into the current branch
    AutoClean {
        /// Actually perform the cleanup (default is a dry run)
        #[arg(long)]
        execute: bool,
    },

    /// Merge every branch that is ahead of its parent
    ShipAll {
        /// Actually perform the shipping (default is a dry run)
        #[arg(long)]
        execute: bool,
    },
}
