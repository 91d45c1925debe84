//! DevFlow - git worktree lifecycle orchestrator
//!
//! CLI entry point wiring the engines to the terminal.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use devflow::cli::{Cli, Command};
use devflow::config::Config;
use devflow::git::Git;
use devflow::interact::{ConsoleInteraction, Interaction};
use devflow::report::{ConsoleReporter, Reporter};
use devflow::worktree::{BatchPolicy, MergeEngine, MergeOptions, Topology, Worktree};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("devflow.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let repo_root = std::env::current_dir().context("Failed to determine working directory")?;
    let git = Git::new(&repo_root);
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter);
    let interaction: Arc<dyn Interaction> = Arc::new(ConsoleInteraction);
    let topology = Topology::new(git.clone(), &config);

    match cli.command {
        Command::New { branch, parent } => cmd_new(&git, &config, reporter.as_ref(), &branch, parent.as_deref()).await,
        Command::List => cmd_list(&topology, reporter.as_ref()).await,
        Command::Merge {
            branch,
            no_cleanup,
            no_push,
            preview,
        } => {
            let engine = MergeEngine::new(git, topology, reporter.clone(), interaction, &config);
            let opts = MergeOptions {
                cleanup: !no_cleanup,
                preview,
                push: !no_push,
            };
            match engine.merge(&branch, opts).await {
                Ok(outcome) if outcome.is_success() => Ok(ExitCode::SUCCESS),
                Ok(_) => Ok(ExitCode::FAILURE),
                Err(e) => {
                    reporter.error(&e.to_string());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::AutoClean { execute } => {
            let engine = MergeEngine::new(git.clone(), topology.clone(), reporter.clone(), interaction.clone(), &config);
            let batch = BatchPolicy::new(git, topology, engine, reporter.clone(), interaction, &config);
            if let Err(e) = batch.auto_clean(!execute).await {
                reporter.error(&format!("Error during auto-clean: {}", e));
            }
            // Nothing to clean is still success
            Ok(ExitCode::SUCCESS)
        }
        Command::ShipAll { execute } => {
            let engine = MergeEngine::new(git.clone(), topology.clone(), reporter.clone(), interaction.clone(), &config);
            let batch = BatchPolicy::new(git, topology, engine, reporter.clone(), interaction, &config);
            if let Err(e) = batch.ship_all(!execute).await {
                reporter.error(&format!("Error during ship-all: {}", e));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Create a worktree on a new branch and record its parent
async fn cmd_new(
    git: &Git,
    config: &Config,
    reporter: &dyn Reporter,
    branch: &str,
    parent: Option<&str>,
) -> Result<ExitCode> {
    let path = PathBuf::from(&config.worktree.base_dir).join(branch);

    if let Err(e) = git.worktree_add(&path, branch, parent).await {
        reporter.error(&format!("Failed to create worktree: {}", e));
        return Ok(ExitCode::FAILURE);
    }

    if let Some(parent) = parent {
        // Record lineage so parent resolution finds it at merge time
        let key = format!("git-town.branch.{}.parent", branch);
        if let Err(e) = git.config_set(&key, parent).await {
            reporter.warn(&format!("Could not record parent branch: {}", e));
        }
    }

    reporter.success(&format!("Created worktree: {}", branch));
    Ok(ExitCode::SUCCESS)
}

/// Print the worktree forest as an indented listing
async fn cmd_list(topology: &Topology, reporter: &dyn Reporter) -> Result<ExitCode> {
    let worktrees = topology.list().await?;

    // Roots are the worktrees nobody claims as a child
    let nested: Vec<&str> = worktrees
        .iter()
        .flat_map(|wt| wt.children.iter().map(String::as_str))
        .collect();

    for wt in &worktrees {
        if !nested.contains(&wt.name.as_str()) {
            render_worktree(wt, &worktrees, reporter, 0);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn render_worktree(wt: &Worktree, all: &[Worktree], reporter: &dyn Reporter, depth: usize) {
    let branch = wt.branch.as_deref().unwrap_or("detached");
    let mut line = format!("{}{}", "  ".repeat(depth), branch);
    if let Some(issue) = &wt.issue {
        line.push_str(&format!(" #{}", issue));
    }
    if wt.is_current {
        line.push_str(" [current]");
    }
    reporter.info(&line);

    for child_name in &wt.children {
        if let Some(child) = all.iter().find(|c| &c.name == child_name) {
            render_worktree(child, all, reporter, depth + 1);
        }
    }
}
