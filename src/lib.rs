//! DevFlow - git worktree lifecycle orchestrator
//!
//! DevFlow manages the lifecycle of git worktrees used for parallel feature
//! development: one worktree per branch, merged back into its parent with
//! backup-and-rollback semantics, then cleaned up. Batch policies decide
//! which branches are ready to ship or safe to remove.
//!
//! # Core Concepts
//!
//! - **Fresh Topology Always**: every query rebuilds the worktree forest
//!   from git metadata; nothing is cached or mutated in place
//! - **Backup Before Mutate**: a timestamped backup ref exists before any
//!   merge touches the parent branch, and survives until completion or a
//!   recorded rollback
//! - **Verified Resolution**: conflict resolution trusts the repository's
//!   unmerged state, never the user's claim or command output
//! - **Injected Capabilities**: output and prompts go through [`report`]
//!   and [`interact`] traits, so scripted and interactive callers share
//!   one pipeline
//!
//! # Modules
//!
//! - [`git`] - one-command-per-operation gateway over the git CLI
//! - [`worktree`] - topology discovery, merge engine, batch policies
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod git;
pub mod interact;
pub mod report;
pub mod worktree;

// Re-export commonly used types
pub use config::Config;
pub use git::{Git, GitError};
pub use interact::{ConsoleInteraction, Interaction, ResolutionChoice, ScriptedInteraction};
pub use report::{ConsoleReporter, MemoryReporter, Reporter};
pub use worktree::{
    BatchPolicy, CleanupCandidate, MergeEngine, MergeError, MergeOptions, MergeOutcome, MergeState, ShipCandidate,
    Topology, Worktree,
};
