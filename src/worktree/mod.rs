//! Worktree lifecycle orchestration
//!
//! Topology discovery over `git worktree` metadata, the merge pipeline with
//! backup-and-rollback semantics, and the batch policies built on both.

pub mod batch;
pub mod merge;
pub mod topology;

pub use batch::{BatchPolicy, CleanupCandidate, ShipCandidate};
pub use merge::{MergeEngine, MergeError, MergeOptions, MergeOutcome, MergeState};
pub use topology::{Topology, Worktree};
