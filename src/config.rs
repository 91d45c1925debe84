//! DevFlow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main DevFlow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Git behavior
    pub git: GitConfig,

    /// Worktree placement and context conventions
    pub worktree: WorktreeConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .devflow.yml
        let local_config = PathBuf::from(".devflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/devflow/devflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("devflow").join("devflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Git behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Branches treated as trunk when no parent is recorded, in
    /// resolution-precedence order
    #[serde(rename = "trunk-branches")]
    pub trunk_branches: Vec<String>,

    /// Abort a merge when the backup branch cannot be created. When false,
    /// the merge proceeds on a failed backup and rollback still tries the
    /// recorded ref.
    #[serde(rename = "strict-backup")]
    pub strict_backup: bool,

    /// Prefix for backup refs created before each merge
    #[serde(rename = "backup-prefix")]
    pub backup_prefix: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            trunk_branches: vec!["main".to_string(), "master".to_string()],
            strict_backup: true,
            backup_prefix: "backup".to_string(),
        }
    }
}

/// Worktree placement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Directory under a worktree root where nested worktrees live
    #[serde(rename = "base-dir")]
    pub base_dir: String,

    /// Per-worktree directory holding issue context files
    #[serde(rename = "context-dir")]
    pub context_dir: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: "worktrees".to_string(),
            context_dir: ".context".to_string(),
        }
    }
}
