//! Merge pipeline with backup-and-rollback semantics
//!
//! Merges a worktree branch into its resolved parent: backup, checkout,
//! merge, conflict resolution, cleanup, push. A backup ref is created
//! before anything mutates and deleted only after a completed merge or a
//! recorded rollback, so a failed merge always has a recovery point.
//!
//! The conflict loop is callback-driven: the engine asks the injected
//! [`Interaction`] what to do and verifies the repository's actual state
//! before trusting any claim of resolution. The operation never returns
//! with the repository sitting mid-conflict.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::git::{Git, GitError};
use crate::interact::{Interaction, ResolutionChoice};
use crate::report::Reporter;
use crate::worktree::topology::{Topology, Worktree};

/// Error types for merge operations
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("branch {0} not found in any worktree")]
    NotFound(String),

    #[error("cannot determine parent branch for {0}")]
    NoParent(String),

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Lifecycle of one merge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Initiated,
    BackedUp,
    CheckedOut,
    MergedClean,
    MergedConflict,
    ConflictResolving,
    Completed,
    RolledBack,
}

/// One merge attempt; discarded once a terminal state is reached
#[derive(Debug)]
struct MergeOperation {
    source_branch: String,
    target_branch: String,
    backup_ref: String,
    state: MergeState,
    conflicted_files: Vec<String>,
}

impl MergeOperation {
    fn transition(&mut self, next: MergeState) {
        debug!(from = ?self.state, to = ?next, branch = %self.source_branch, "merge state transition");
        self.state = next;
    }
}

/// Caller options for [`MergeEngine::merge`]
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Remove the worktree and delete the branch after a clean merge
    pub cleanup: bool,
    /// Show the pending commits and diff, confirm, and return without merging
    pub preview: bool,
    /// Push the parent branch after a clean merge
    pub push: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            cleanup: true,
            preview: false,
            push: true,
        }
    }
}

/// Result of a merge invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge commit created; warnings carry partial cleanup/push failures
    Merged { warnings: Vec<String> },
    /// Preview ran; nothing was mutated regardless of the answer
    Previewed { confirmed: bool },
    /// Merge failed or was abandoned and the parent was restored
    RolledBack { reason: String },
    /// Operation stopped before mutating the parent branch
    Aborted { reason: String },
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Merged { .. } => true,
            Self::Previewed { confirmed } => *confirmed,
            Self::RolledBack { .. } | Self::Aborted { .. } => false,
        }
    }
}

/// Executes the merge pipeline for one branch at a time
pub struct MergeEngine {
    git: Git,
    topology: Topology,
    reporter: Arc<dyn Reporter>,
    interaction: Arc<dyn Interaction>,
    strict_backup: bool,
    backup_prefix: String,
}

impl MergeEngine {
    pub fn new(
        git: Git,
        topology: Topology,
        reporter: Arc<dyn Reporter>,
        interaction: Arc<dyn Interaction>,
        config: &Config,
    ) -> Self {
        Self {
            git,
            topology,
            reporter,
            interaction,
            strict_backup: config.git.strict_backup,
            backup_prefix: config.git.backup_prefix.clone(),
        }
    }

    /// Merge a branch into its parent.
    ///
    /// The branch is looked up among active worktrees (by branch or worktree
    /// name), its parent resolved through the topology, and the pipeline run
    /// to a terminal state. Command failures inside the pipeline become
    /// reported outcomes; only lookup failures surface as errors.
    pub async fn merge(&self, branch: &str, opts: MergeOptions) -> Result<MergeOutcome, MergeError> {
        info!(%branch, ?opts, "merge requested");

        // 1. Resolve the target worktree and its parent branch
        let target = self
            .topology
            .find(branch)
            .await?
            .ok_or_else(|| MergeError::NotFound(branch.to_string()))?;

        let parent = self
            .topology
            .resolve_parent(&target)
            .await?
            .ok_or_else(|| MergeError::NoParent(branch.to_string()))?;

        // 2. Preview is read-only by contract: report, confirm, return
        if opts.preview {
            return self.preview(branch, &parent).await;
        }

        let mut op = MergeOperation {
            source_branch: branch.to_string(),
            target_branch: parent.clone(),
            backup_ref: format!(
                "{}/{}-{}",
                self.backup_prefix,
                branch,
                Local::now().format("%Y%m%d-%H%M%S")
            ),
            state: MergeState::Initiated,
            conflicted_files: Vec::new(),
        };

        // 3. Back up the parent tip before anything mutates
        match self.git.branch_create(&op.backup_ref, &parent).await {
            Ok(()) => {
                self.reporter.info(&format!("Created backup: {}", op.backup_ref));
            }
            Err(e) if self.strict_backup => {
                self.reporter.error(&format!("Failed to create backup branch {}: {}", op.backup_ref, e));
                return Ok(MergeOutcome::Aborted {
                    reason: format!("backup creation failed: {}", e),
                });
            }
            Err(e) => {
                // Lenient mode: proceed, rollback still tries the recorded ref
                self.reporter.warn(&format!("Proceeding without verified backup ({})", e));
            }
        }
        op.transition(MergeState::BackedUp);

        self.reporter.info(&format!("Merging {} into {}...", branch, parent));

        // 4. Check out the parent; nothing has been mutated yet on failure
        if let Err(e) = self.git.checkout(&parent).await {
            self.reporter.error(&format!("Failed to checkout {}: {}", parent, e));
            return Ok(MergeOutcome::Aborted {
                reason: format!("checkout failed: {}", e),
            });
        }
        op.transition(MergeState::CheckedOut);

        // 5. Merge with a forced merge commit
        if let Err(e) = self.git.merge_no_ff(branch).await {
            // Ask the repository whether this is a conflict, not the output
            let conflicted = self.git.unmerged_paths().await.unwrap_or_default();
            let in_progress = self.git.merge_in_progress().await.unwrap_or(false);

            if !conflicted.is_empty() || in_progress {
                op.conflicted_files = conflicted;
                op.transition(MergeState::MergedConflict);
                return self.resolve_conflicts(&mut op).await;
            }

            self.reporter.error(&format!("Merge failed: {}", e));
            self.rollback(&mut op).await;
            return Ok(MergeOutcome::RolledBack {
                reason: format!("merge failed: {}", e),
            });
        }
        op.transition(MergeState::MergedClean);

        self.reporter.success(&format!("Successfully merged {} into {}", branch, parent));

        // 6. Cleanup and push are best-effort; failures downgrade to warnings
        let mut warnings = Vec::new();
        if opts.cleanup {
            warnings.extend(self.cleanup(&target, branch).await);
        }

        if opts.push {
            match self.git.push().await {
                Ok(()) => self.reporter.success("Changes pushed to remote"),
                Err(e) => {
                    let warning = format!("Failed to push changes: {}", e);
                    self.reporter.warn(&warning);
                    warnings.push(warning);
                }
            }
        } else {
            self.reporter.info("Changes merged locally. Use 'git push' to publish them");
        }

        // 7. The merge is in; the backup has served its purpose
        if let Err(e) = self.git.branch_delete(&op.backup_ref).await {
            warn!(backup = %op.backup_ref, "failed to delete backup ref: {}", e);
        }
        op.transition(MergeState::Completed);

        Ok(MergeOutcome::Merged { warnings })
    }

    /// Remove a merged branch's worktree and delete the branch.
    ///
    /// Each step is independently best-effort; returned strings are the
    /// warnings for whatever failed.
    pub async fn cleanup(&self, worktree: &Worktree, branch: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.git.worktree_remove(&worktree.path).await {
            Ok(()) => self.reporter.success(&format!("Removed worktree: {}", worktree.name)),
            Err(e) => {
                let warning = format!("Could not remove worktree {}: {}", worktree.name, e);
                self.reporter.warn(&warning);
                warnings.push(warning);
            }
        }

        match self.git.branch_delete(branch).await {
            Ok(()) => self.reporter.success(&format!("Deleted branch: {}", branch)),
            Err(e) => {
                let warning = format!("Could not delete branch {}: {}", branch, e);
                self.reporter.warn(&warning);
                warnings.push(warning);
            }
        }

        warnings
    }

    /// Show what the merge would do, then return without mutating.
    ///
    /// The confirmation answer is reported back to the caller, but even a
    /// yes does not merge; the caller re-invokes without preview for that.
    async fn preview(&self, branch: &str, parent: &str) -> Result<MergeOutcome, MergeError> {
        self.reporter.info(&format!("Merge preview: {} -> {}", branch, parent));

        let commits = self.git.log_range(parent, branch).await?;
        if commits.trim().is_empty() {
            self.reporter.info("No commits to merge");
            return Ok(MergeOutcome::Previewed { confirmed: true });
        }
        self.reporter.info("Commits to be merged:");
        self.reporter.detail(commits.trim_end());

        let files = self.git.diff_name_status(parent, branch).await?;
        if !files.trim().is_empty() {
            self.reporter.info("Files that will be changed:");
            self.reporter.detail(files.trim_end());
        }

        let confirmed = self.interaction.confirm("Proceed with merge?", true).await;
        if !confirmed {
            self.reporter.warn("Merge cancelled");
        }

        Ok(MergeOutcome::Previewed { confirmed })
    }

    /// Drive the conflict-resolution loop to a terminal state.
    ///
    /// Exits only through abort (rollback) or a resolution the repository
    /// confirms: no unmerged paths and no merge left in progress.
    async fn resolve_conflicts(&self, op: &mut MergeOperation) -> Result<MergeOutcome, MergeError> {
        self.reporter.error("Merge conflicts detected");
        if !op.conflicted_files.is_empty() {
            self.reporter.info("Files with conflicts:");
            for file in &op.conflicted_files {
                self.reporter.detail(&format!("  {}", file));
            }
        }

        op.transition(MergeState::ConflictResolving);

        loop {
            let choice = self.interaction.choose_resolution(&op.conflicted_files).await;
            debug!(?choice, branch = %op.source_branch, "conflict resolution choice");

            match choice {
                ResolutionChoice::MergeTool => {
                    if !self.git.mergetool().await.unwrap_or(false) {
                        self.reporter.warn("Merge tool not configured or failed");
                        continue;
                    }
                    if !self.interaction.confirm("Conflicts resolved? Ready to commit?", true).await {
                        continue;
                    }
                    if let Err(e) = self.git.commit_no_edit().await {
                        self.reporter.error(&format!("Commit failed: {}", e));
                        self.rollback(op).await;
                        return Ok(MergeOutcome::RolledBack {
                            reason: format!("commit failed: {}", e),
                        });
                    }
                    if self.merge_settled().await {
                        return Ok(self.complete_resolved(op).await);
                    }
                    self.reporter.warn("Conflicts still present. Please resolve them");
                }

                ResolutionChoice::Manual => {
                    self.reporter.info("Manual resolution steps:");
                    self.reporter.info("  1. Edit conflicted files and remove conflict markers");
                    self.reporter.info("  2. git add <resolved-files>");
                    self.reporter.info("  3. git commit");
                    if !self.interaction.resolve_manually().await {
                        continue;
                    }
                    if self.merge_settled().await {
                        return Ok(self.complete_resolved(op).await);
                    }
                    self.reporter.warn("Conflicts still exist. Please resolve them");
                }

                ResolutionChoice::Abort => {
                    let _ = self.git.merge_abort().await;
                    self.rollback(op).await;
                    return Ok(MergeOutcome::RolledBack {
                        reason: "merge aborted".to_string(),
                    });
                }

                ResolutionChoice::ShowDiff => {
                    match self.git.diff_working().await {
                        Ok(diff) => {
                            // keep terminal output bounded
                            let shown: String = diff.chars().take(2000).collect();
                            self.reporter.detail(&shown);
                            if diff.len() > shown.len() {
                                self.reporter.info("... (output truncated)");
                            }
                        }
                        Err(e) => self.reporter.warn(&format!("Could not show diff: {}", e)),
                    }
                }
            }
        }
    }

    /// No unmerged paths and no merge in progress
    async fn merge_settled(&self) -> bool {
        let unmerged = self.git.unmerged_paths().await.unwrap_or_default();
        let in_progress = self.git.merge_in_progress().await.unwrap_or(true);
        unmerged.is_empty() && !in_progress
    }

    async fn complete_resolved(&self, op: &mut MergeOperation) -> MergeOutcome {
        if let Err(e) = self.git.branch_delete(&op.backup_ref).await {
            warn!(backup = %op.backup_ref, "failed to delete backup ref: {}", e);
        }
        op.transition(MergeState::Completed);
        self.reporter.success("Merge completed successfully");
        MergeOutcome::Merged { warnings: Vec::new() }
    }

    /// Restore the parent to the backup ref after a failed merge.
    ///
    /// A rollback that itself fails keeps the backup ref alive and reports
    /// the exact recovery command; it is never silently swallowed.
    async fn rollback(&self, op: &mut MergeOperation) {
        self.reporter.warn("Rolling back merge...");

        if let Err(e) = self.git.reset_hard(&op.backup_ref).await {
            self.reporter.error(&format!("Rollback failed: {}", e));
            self.reporter.warn(&format!("Manual recovery: git reset --hard {}", op.backup_ref));
            op.transition(MergeState::RolledBack);
            return;
        }
        self.reporter.success(&format!("Rollback complete. Restored {}", op.target_branch));

        if let Err(e) = self.git.branch_delete(&op.backup_ref).await {
            warn!(backup = %op.backup_ref, "failed to delete backup ref after rollback: {}", e);
        }
        op.transition(MergeState::RolledBack);
    }
}
