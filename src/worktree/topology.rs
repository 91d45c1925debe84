//! Worktree topology discovery
//!
//! Parses `git worktree list --porcelain` into an annotated forest: each
//! worktree gets a display name, an associated issue (from its context
//! directory), and its nested children. Every query rebuilds the forest
//! from scratch; records are never mutated after construction.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::git::{Git, GitResult};

/// A single worktree and its derived metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    /// Absolute path, unique within one listing
    pub path: PathBuf,
    /// Last path segment; the root worktree is always "main"
    pub name: String,
    /// Checked-out branch; `None` when detached
    pub branch: Option<String>,
    /// Commit id at HEAD
    pub head: String,
    pub detached: bool,
    /// Exact match against the process working directory
    pub is_current: bool,
    pub has_context: bool,
    /// Issue id parsed from an `issue-<id>.*` context file
    pub issue: Option<String>,
    /// Names of worktrees nested one level under this one
    pub children: Vec<String>,
}

impl Worktree {
    /// Worktrees are addressed by branch name or directory name
    pub fn matches(&self, name: &str) -> bool {
        self.branch.as_deref() == Some(name) || self.name == name
    }
}

/// One block of the porcelain dump, before annotation
#[derive(Debug, Default)]
struct RawEntry {
    path: Option<PathBuf>,
    head: Option<String>,
    branch: Option<String>,
    detached: bool,
}

/// Builds worktree forests and resolves parent branches
#[derive(Debug, Clone)]
pub struct Topology {
    git: Git,
    context_dir: String,
    nest_dir: String,
    trunks: Vec<String>,
}

impl Topology {
    pub fn new(git: Git, config: &Config) -> Self {
        Self {
            git,
            context_dir: config.worktree.context_dir.clone(),
            nest_dir: config.worktree.base_dir.clone(),
            trunks: config.git.trunk_branches.clone(),
        }
    }

    /// List all worktrees with their metadata, ordered as git reports them
    pub async fn list(&self) -> GitResult<Vec<Worktree>> {
        let dump = self.git.worktree_list().await?;
        let cwd = std::env::current_dir().unwrap_or_default();
        let worktrees = annotate(parse_porcelain(&dump), &cwd, &self.context_dir, &self.nest_dir);
        debug!(count = worktrees.len(), "topology: listed worktrees");
        Ok(worktrees)
    }

    /// Find the worktree a branch or worktree name refers to
    pub async fn find(&self, name: &str) -> GitResult<Option<Worktree>> {
        let worktrees = self.list().await?;
        Ok(worktrees.into_iter().find(|wt| wt.matches(name)))
    }

    /// Determine the parent branch for a worktree.
    ///
    /// A recorded parent (`git config git-town.branch.<name>.parent`) wins
    /// unconditionally; otherwise the first existing trunk branch (`main`,
    /// then `master`) is the parent. `None` when neither resolves.
    pub async fn resolve_parent(&self, worktree: &Worktree) -> GitResult<Option<String>> {
        if let Some(branch) = &worktree.branch {
            let key = format!("git-town.branch.{}.parent", branch);
            if let Some(parent) = self.git.config_get(&key).await? {
                if !parent.is_empty() {
                    debug!(%branch, %parent, "topology: parent from config");
                    return Ok(Some(parent));
                }
            }
        }

        for candidate in &self.trunks {
            if self.git.branch_exists(candidate).await? {
                debug!(parent = %candidate, "topology: parent from trunk fallback");
                return Ok(Some(candidate.clone()));
            }
        }

        Ok(None)
    }
}

/// Split a porcelain dump into raw entries on blank-line block boundaries
fn parse_porcelain(dump: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;

    for line in dump.lines() {
        if let Some(rest) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(RawEntry {
                path: Some(PathBuf::from(rest)),
                ..Default::default()
            });
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            if let Some(entry) = current.as_mut() {
                entry.head = Some(rest.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("branch ") {
            if let Some(entry) = current.as_mut() {
                entry.branch = Some(rest.trim_start_matches("refs/heads/").to_string());
            }
        } else if line == "detached" {
            if let Some(entry) = current.as_mut() {
                entry.detached = true;
            }
        } else if line.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
        }
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    entries
}

/// Annotate raw entries: names first, then children from a parent-indexed map
fn annotate(entries: Vec<RawEntry>, cwd: &Path, context_dir: &str, nest_dir: &str) -> Vec<Worktree> {
    // Git lists the main worktree first
    let root = entries.first().and_then(|entry| entry.path.clone());

    let mut worktrees: Vec<Worktree> = entries
        .into_iter()
        .filter_map(|entry| {
            let path = entry.path?;
            let name = if Some(&path) == root.as_ref() {
                "main".to_string()
            } else {
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            };
            let (has_context, issue) = scan_context(&path, context_dir);

            Some(Worktree {
                name,
                branch: entry.branch,
                head: entry.head.unwrap_or_default(),
                detached: entry.detached,
                is_current: path == cwd,
                has_context,
                issue,
                children: Vec::new(),
                path,
            })
        })
        .collect();

    // Index every worktree under its path's grandparent directory, so child
    // lookup is one map hit per record instead of a nested scan
    let mut by_grandparent: HashMap<PathBuf, Vec<String>> = HashMap::new();
    for wt in &worktrees {
        if let Some(grand) = wt.path.parent().and_then(Path::parent) {
            by_grandparent.entry(grand.to_path_buf()).or_default().push(wt.name.clone());
        }
    }

    // A child is nested exactly one level under a non-root worktree's nest dir
    for wt in &mut worktrees {
        if Some(&wt.path) == root.as_ref() {
            continue;
        }
        if !wt.path.join(nest_dir).exists() {
            continue;
        }
        if let Some(names) = by_grandparent.get(&wt.path) {
            wt.children = names.clone();
        }
    }

    worktrees
}

/// Look for a context directory and the first issue file inside it
fn scan_context(path: &Path, context_dir: &str) -> (bool, Option<String>) {
    let context_path = path.join(context_dir);
    if !context_path.is_dir() {
        return (false, None);
    }

    // First match in enumeration order wins; no sorting contract
    let issue = fs::read_dir(&context_path).ok().and_then(|entries| {
        for entry in entries.flatten() {
            let file = entry.path();
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                if let Some(id) = stem.strip_prefix("issue-") {
                    return Some(id.to_string());
                }
            }
        }
        None
    });

    (true, issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashSet;
    use tempfile::tempdir;
    use tokio::process::Command;

    const SAMPLE: &str = "\
worktree /repo
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /repo/worktrees/feature-x
HEAD 2222222222222222222222222222222222222222
branch refs/heads/feature-x

worktree /repo/worktrees/spike
HEAD 3333333333333333333333333333333333333333
detached
";

    #[test]
    fn test_parse_porcelain_paths_unique() {
        let entries = parse_porcelain(SAMPLE);
        assert_eq!(entries.len(), 3);

        let paths: HashSet<_> = entries.iter().map(|e| e.path.clone().unwrap()).collect();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_parse_porcelain_fields() {
        let entries = parse_porcelain(SAMPLE);

        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert!(!entries[0].detached);

        assert_eq!(entries[1].path.as_deref(), Some(Path::new("/repo/worktrees/feature-x")));
        assert_eq!(entries[1].head.as_deref(), Some("2222222222222222222222222222222222222222"));

        assert_eq!(entries[2].branch, None);
        assert!(entries[2].detached);
    }

    #[test]
    fn test_parse_porcelain_without_trailing_blank() {
        let dump = "worktree /a\nHEAD abc\nbranch refs/heads/x";
        let entries = parse_porcelain(dump);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch.as_deref(), Some("x"));
    }

    #[test]
    fn test_annotate_names_root_main() {
        let worktrees = annotate(parse_porcelain(SAMPLE), Path::new("/elsewhere"), ".context", "worktrees");

        assert_eq!(worktrees[0].name, "main");
        assert_eq!(worktrees[1].name, "feature-x");
        assert_eq!(worktrees[2].name, "spike");
        assert!(worktrees.iter().all(|wt| !wt.is_current));
    }

    #[test]
    fn test_annotate_is_current_exact_path() {
        let worktrees = annotate(
            parse_porcelain(SAMPLE),
            Path::new("/repo/worktrees/feature-x"),
            ".context",
            "worktrees",
        );

        assert!(!worktrees[0].is_current);
        assert!(worktrees[1].is_current);
    }

    #[test]
    fn test_annotate_children_one_level_nesting() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("repo");
        let parent = root.join("worktrees").join("parent");
        let child = parent.join("worktrees").join("child");
        fs::create_dir_all(child.join("worktrees")).unwrap();

        let dump = format!(
            "worktree {}\nHEAD aaa\nbranch refs/heads/main\n\n\
             worktree {}\nHEAD bbb\nbranch refs/heads/parent\n\n\
             worktree {}\nHEAD ccc\nbranch refs/heads/child\n",
            root.display(),
            parent.display(),
            child.display(),
        );

        let worktrees = annotate(parse_porcelain(&dump), Path::new("/elsewhere"), ".context", "worktrees");

        // parent holds child; the root worktree never lists children
        assert_eq!(worktrees[1].children, vec!["child"]);
        assert!(worktrees[0].children.is_empty());
        assert!(worktrees[2].children.is_empty());
    }

    #[test]
    fn test_scan_context_first_issue_wins() {
        let dir = tempdir().unwrap();
        let wt = dir.path().join("feature");
        fs::create_dir_all(wt.join(".context")).unwrap();
        fs::write(wt.join(".context").join("issue-42.md"), "notes").unwrap();

        let (has_context, issue) = scan_context(&wt, ".context");
        assert!(has_context);
        assert_eq!(issue.as_deref(), Some("42"));
    }

    #[test]
    fn test_scan_context_absent() {
        let dir = tempdir().unwrap();
        let (has_context, issue) = scan_context(dir.path(), ".context");
        assert!(!has_context);
        assert_eq!(issue, None);
    }

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

    fn sample_worktree(branch: &str) -> Worktree {
        Worktree {
            path: PathBuf::from("/tmp/wt"),
            name: branch.to_string(),
            branch: Some(branch.to_string()),
            head: String::new(),
            detached: false,
            is_current: false,
            has_context: false,
            issue: None,
            children: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_resolve_parent_config_beats_trunk() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        git.branch_create("feature", "main").await.unwrap();
        git.config_set("git-town.branch.feature.parent", "develop").await.unwrap();

        let topology = Topology::new(git, &Config::default());
        let parent = topology.resolve_parent(&sample_worktree("feature")).await.unwrap();

        // main exists, but the recorded parent wins
        assert_eq!(parent.as_deref(), Some("develop"));
    }

    #[tokio::test]
    async fn test_resolve_parent_main_beats_master() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        git.branch_create("master", "main").await.unwrap();
        git.branch_create("feature", "main").await.unwrap();

        let topology = Topology::new(git, &Config::default());
        let parent = topology.resolve_parent(&sample_worktree("feature")).await.unwrap();

        assert_eq!(parent.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_resolve_parent_falls_back_to_master() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        Command::new("git")
            .args(["branch", "-M", "master"])
            .current_dir(repo.path())
            .output()
            .await
            .unwrap();

        let git = Git::new(repo.path());
        git.branch_create("feature", "master").await.unwrap();

        let topology = Topology::new(git, &Config::default());
        let parent = topology.resolve_parent(&sample_worktree("feature")).await.unwrap();

        assert_eq!(parent.as_deref(), Some("master"));
    }

    #[tokio::test]
    async fn test_list_matches_porcelain_paths() {
        let repo = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let git = Git::new(repo.path());
        let wt_path = repo.path().join("worktrees").join("feature");
        git.worktree_add(&wt_path, "feature", None).await.unwrap();

        let topology = Topology::new(git.clone(), &Config::default());
        let worktrees = topology.list().await.unwrap();
        assert_eq!(worktrees.len(), 2);

        let dump = git.worktree_list().await.unwrap();
        for wt in &worktrees {
            assert!(dump.contains(&format!("worktree {}", wt.path.display())));
        }

        assert_eq!(worktrees[0].name, "main");
        assert_eq!(worktrees[1].branch.as_deref(), Some("feature"));
    }
}
