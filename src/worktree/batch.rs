//! Batch policies over the worktree forest
//!
//! Two sweeps: auto-clean removes branches already merged into the current
//! branch, ship-all merges every branch sitting ahead of its parent. Both
//! run in dry-run mode by default and mutate nothing until executed, and
//! both walk candidates strictly one at a time since merges share branch
//! refs.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::git::Git;
use crate::interact::Interaction;
use crate::report::Reporter;
use crate::worktree::merge::{MergeEngine, MergeError, MergeOptions};
use crate::worktree::topology::{Topology, Worktree};

/// A merged branch whose worktree can be removed
#[derive(Debug, Clone)]
pub struct CleanupCandidate {
    pub branch: String,
    pub worktree: Worktree,
}

/// A branch ahead of its parent and ready to merge
#[derive(Debug, Clone)]
pub struct ShipCandidate {
    pub branch: String,
    pub parent: String,
    pub commits_ahead: u32,
    pub worktree: Worktree,
}

/// Decides which branches qualify for batch cleanup or shipping
pub struct BatchPolicy {
    git: Git,
    topology: Topology,
    engine: MergeEngine,
    reporter: Arc<dyn Reporter>,
    interaction: Arc<dyn Interaction>,
    trunks: Vec<String>,
}

impl BatchPolicy {
    pub fn new(
        git: Git,
        topology: Topology,
        engine: MergeEngine,
        reporter: Arc<dyn Reporter>,
        interaction: Arc<dyn Interaction>,
        config: &Config,
    ) -> Self {
        Self {
            git,
            topology,
            engine,
            reporter,
            interaction,
            trunks: config.git.trunk_branches.clone(),
        }
    }

    /// Branches merged into the current branch, trunks excluded
    async fn merged_branches(&self) -> Result<Vec<String>, MergeError> {
        let out = self.git.merged_branches().await?;
        Ok(out
            .lines()
            .map(|line| line.trim_start_matches(['*', '+', ' ']).trim().to_string())
            .filter(|branch| !branch.is_empty() && !self.trunks.contains(branch))
            .collect())
    }

    /// Remove worktrees and branches that are fully merged.
    ///
    /// Dry run reports the candidates without touching the repository.
    /// Execute mode re-confirms, then cleans each candidate independently;
    /// one failure does not stop the batch. Returns the branches that were
    /// fully cleaned.
    pub async fn auto_clean(&self, dry_run: bool) -> Result<Vec<String>, MergeError> {
        info!(dry_run, "auto-clean requested");
        self.reporter.info("Scanning for merged branches...");

        let merged = self.merged_branches().await?;
        if merged.is_empty() {
            self.reporter.success("No merged branches found for cleanup");
            return Ok(Vec::new());
        }

        let worktrees = self.topology.list().await?;
        let candidates: Vec<CleanupCandidate> = merged
            .iter()
            .filter_map(|branch| {
                worktrees
                    .iter()
                    .find(|wt| wt.branch.as_deref() == Some(branch.as_str()))
                    .map(|wt| CleanupCandidate {
                        branch: branch.clone(),
                        worktree: wt.clone(),
                    })
            })
            .collect();

        if candidates.is_empty() {
            self.reporter.success("No worktrees found for merged branches");
            return Ok(Vec::new());
        }

        if dry_run {
            self.reporter.info(&format!("Would clean up {} items:", candidates.len()));
            for candidate in &candidates {
                self.reporter
                    .info(&format!("  - branch: {}, worktree: {}", candidate.branch, candidate.worktree.name));
            }
            return Ok(candidates.into_iter().map(|c| c.branch).collect());
        }

        let question = format!(
            "Clean up {} merged branches and their worktrees?",
            candidates.len()
        );
        if !self.interaction.confirm(&question, true).await {
            self.reporter.warn("Cleanup cancelled");
            return Ok(Vec::new());
        }

        let mut cleaned = Vec::new();
        for candidate in candidates {
            debug!(branch = %candidate.branch, "auto-clean: cleaning candidate");
            let warnings = self.engine.cleanup(&candidate.worktree, &candidate.branch).await;
            if warnings.is_empty() {
                cleaned.push(candidate.branch);
            } else {
                self.reporter.error(&format!("Failed to fully clean up {}", candidate.branch));
            }
        }

        self.reporter.success(&format!("Cleaned up {} branches", cleaned.len()));
        Ok(cleaned)
    }

    /// Every worktree branch that is ahead of its resolvable parent
    async fn ship_candidates(&self) -> Result<Vec<ShipCandidate>, MergeError> {
        let worktrees = self.topology.list().await?;
        let mut candidates = Vec::new();

        for wt in &worktrees {
            let Some(branch) = wt.branch.clone() else {
                continue;
            };
            if wt.detached || self.trunks.contains(&branch) {
                continue;
            }
            let Some(parent) = self.topology.resolve_parent(wt).await? else {
                continue;
            };
            let commits_ahead = match self.git.rev_list_count(&parent, &branch).await {
                Ok(n) => n,
                Err(e) => {
                    debug!(%branch, %parent, "ship-all: rev-list failed: {}", e);
                    continue;
                }
            };
            if commits_ahead > 0 {
                candidates.push(ShipCandidate {
                    branch,
                    parent,
                    commits_ahead,
                    worktree: wt.clone(),
                });
            }
        }

        Ok(candidates)
    }

    /// Merge every ready branch into its parent via the full pipeline.
    ///
    /// Dry run lists `{branch, parent, commits_ahead}` without mutating.
    /// Execute mode re-confirms, then ships sequentially with cleanup on;
    /// failed candidates are reported and skipped. Returns the branches
    /// that fully succeeded.
    pub async fn ship_all(&self, dry_run: bool) -> Result<Vec<String>, MergeError> {
        info!(dry_run, "ship-all requested");
        self.reporter.info("Scanning for ready branches...");

        let candidates = self.ship_candidates().await?;
        if candidates.is_empty() {
            self.reporter.success("No ready branches found for shipping");
            return Ok(Vec::new());
        }

        let verb = if dry_run { "Would ship" } else { "Ready to ship" };
        self.reporter.info(&format!("{} {} branches:", verb, candidates.len()));
        for candidate in &candidates {
            self.reporter.info(&format!(
                "  - {} -> {} ({} commits)",
                candidate.branch, candidate.parent, candidate.commits_ahead
            ));
        }

        if dry_run {
            return Ok(candidates.into_iter().map(|c| c.branch).collect());
        }

        let question = format!("Ship all {} branches?", candidates.len());
        if !self.interaction.confirm(&question, true).await {
            self.reporter.warn("Shipping cancelled");
            return Ok(Vec::new());
        }

        let opts = MergeOptions {
            cleanup: true,
            preview: false,
            push: true,
        };

        let mut shipped = Vec::new();
        for candidate in candidates {
            self.reporter.info(&format!("Shipping {}...", candidate.branch));
            match self.engine.merge(&candidate.branch, opts).await {
                Ok(outcome) if outcome.is_success() => shipped.push(candidate.branch),
                Ok(_) => self.reporter.error(&format!("Failed to ship {}", candidate.branch)),
                Err(e) => self.reporter.error(&format!("Failed to ship {}: {}", candidate.branch, e)),
            }
        }

        self.reporter.success(&format!("Shipped {} branches", shipped.len()));
        Ok(shipped)
    }
}
