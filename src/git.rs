//! Thin gateway over the `git` command line
//!
//! Every operation issues exactly one git subcommand in the repository root
//! and returns parsed stdout on success or a structured failure carrying the
//! exit code and stderr. No retries here; retry policy belongs to callers.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

/// Error types for git operations
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {args} failed (exit {code}): {stderr}")]
    CommandFailed { args: String, code: i32, stderr: String },

    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("unexpected git output: {0}")]
    Unparsable(String),
}

pub type GitResult<T> = Result<T, GitError>;

/// Gateway to a single repository
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run one git command, returning stdout on zero exit
    async fn run(&self, args: &[&str]) -> GitResult<String> {
        debug!(?args, "git: run");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run one git command where a non-zero exit is an answer, not an error
    async fn probe(&self, args: &[&str]) -> GitResult<Option<String>> {
        debug!(?args, "git: probe");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await?;

        if !output.status.success() {
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    /// Raw `git worktree list --porcelain` dump
    pub async fn worktree_list(&self) -> GitResult<String> {
        self.run(&["worktree", "list", "--porcelain"]).await
    }

    /// Create a worktree on a new branch, optionally from a start point
    pub async fn worktree_add(&self, path: &Path, branch: &str, start: Option<&str>) -> GitResult<()> {
        let path = path.to_string_lossy();
        let mut args = vec!["worktree", "add", path.as_ref(), "-b", branch];
        if let Some(start) = start {
            args.push(start);
        }
        self.run(&args).await.map(|_| ())
    }

    /// Remove a worktree directory, discarding local changes
    pub async fn worktree_remove(&self, path: &Path) -> GitResult<()> {
        let path = path.to_string_lossy();
        self.run(&["worktree", "remove", path.as_ref(), "--force"]).await.map(|_| ())
    }

    /// Does `refs/heads/<branch>` exist?
    pub async fn branch_exists(&self, branch: &str) -> GitResult<bool> {
        let refname = format!("refs/heads/{}", branch);
        Ok(self.probe(&["show-ref", "--verify", "--quiet", &refname]).await?.is_some())
    }

    pub async fn branch_create(&self, name: &str, start_point: &str) -> GitResult<()> {
        self.run(&["branch", name, start_point]).await.map(|_| ())
    }

    pub async fn branch_delete(&self, name: &str) -> GitResult<()> {
        self.run(&["branch", "-D", name]).await.map(|_| ())
    }

    /// Raw `git branch --merged` output (merged into the current branch)
    pub async fn merged_branches(&self) -> GitResult<String> {
        self.run(&["branch", "--merged"]).await
    }

    pub async fn checkout(&self, branch: &str) -> GitResult<()> {
        self.run(&["checkout", branch]).await.map(|_| ())
    }

    /// Merge a branch into the current one, always creating a merge commit
    pub async fn merge_no_ff(&self, branch: &str) -> GitResult<()> {
        self.run(&["merge", branch, "--no-ff"]).await.map(|_| ())
    }

    pub async fn merge_abort(&self) -> GitResult<()> {
        self.run(&["merge", "--abort"]).await.map(|_| ())
    }

    /// Is a merge currently in progress (MERGE_HEAD present)?
    pub async fn merge_in_progress(&self) -> GitResult<bool> {
        Ok(self.probe(&["rev-parse", "-q", "--verify", "MERGE_HEAD"]).await?.is_some())
    }

    /// Paths with unresolved conflicts
    pub async fn unmerged_paths(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// Conclude an in-progress merge with the prepared message
    pub async fn commit_no_edit(&self) -> GitResult<()> {
        self.run(&["commit", "--no-edit"]).await.map(|_| ())
    }

    pub async fn reset_hard(&self, refname: &str) -> GitResult<()> {
        self.run(&["reset", "--hard", refname]).await.map(|_| ())
    }

    /// Commits on `branch` that are not on `parent`, oneline graph form
    pub async fn log_range(&self, parent: &str, branch: &str) -> GitResult<String> {
        let range = format!("{}..{}", parent, branch);
        self.run(&["log", &range, "--oneline", "--graph"]).await
    }

    /// Name-status diff of what merging `branch` would change on `parent`
    pub async fn diff_name_status(&self, parent: &str, branch: &str) -> GitResult<String> {
        let range = format!("{}...{}", parent, branch);
        self.run(&["diff", &range, "--name-status"]).await
    }

    /// Full working-tree diff, conflict markers included
    pub async fn diff_working(&self) -> GitResult<String> {
        self.run(&["diff"]).await
    }

    /// Number of commits on `branch` that `parent` does not have
    pub async fn rev_list_count(&self, parent: &str, branch: &str) -> GitResult<u32> {
        let range = format!("{}..{}", parent, branch);
        let out = self.run(&["rev-list", "--count", &range]).await?;
        out.trim().parse().map_err(|_| GitError::Unparsable(out.trim().to_string()))
    }

    pub async fn rev_parse(&self, refname: &str) -> GitResult<String> {
        let out = self.run(&["rev-parse", refname]).await?;
        Ok(out.trim().to_string())
    }

    pub async fn push(&self) -> GitResult<()> {
        self.run(&["push"]).await.map(|_| ())
    }

    pub async fn config_get(&self, key: &str) -> GitResult<Option<String>> {
        Ok(self.probe(&["config", key]).await?.map(|v| v.trim().to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> GitResult<()> {
        self.run(&["config", key, value]).await.map(|_| ())
    }

    /// Hand the terminal to `git mergetool`; returns whether it exited clean
    pub async fn mergetool(&self) -> GitResult<bool> {
        debug!("git: mergetool");
        let status = Command::new("git")
            .arg("mergetool")
            .current_dir(&self.repo_root)
            .status()
            .await?;
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_git_repo(dir: &Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["branch", "-M", "main"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_reports_exit_code_and_stderr() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        let err = git.checkout("no-such-branch").await.unwrap_err();

        match err {
            GitError::CommandFailed { code, stderr, .. } => {
                assert_ne!(code, 0);
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_branch_exists() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        assert!(git.branch_exists("main").await.unwrap());
        assert!(!git.branch_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_branch_create_and_delete() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        git.branch_create("scratch", "main").await.unwrap();
        assert!(git.branch_exists("scratch").await.unwrap());

        git.branch_delete("scratch").await.unwrap();
        assert!(!git.branch_exists("scratch").await.unwrap());
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        assert_eq!(git.config_get("devflow.test.key").await.unwrap(), None);

        git.config_set("devflow.test.key", "value").await.unwrap();
        assert_eq!(git.config_get("devflow.test.key").await.unwrap(), Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_rev_list_count() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        git.run(&["checkout", "-b", "feature"]).await.unwrap();
        git.run(&["commit", "--allow-empty", "-m", "one"]).await.unwrap();
        git.run(&["commit", "--allow-empty", "-m", "two"]).await.unwrap();

        assert_eq!(git.rev_list_count("main", "feature").await.unwrap(), 2);
        assert_eq!(git.rev_list_count("feature", "main").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_merge_in_progress_false_on_clean_repo() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        assert!(!git.merge_in_progress().await.unwrap());
        assert!(git.unmerged_paths().await.unwrap().is_empty());
    }
}
