//! Interactive prompts as an injected capability
//!
//! The merge engine never reads the terminal itself; callers supply an
//! [`Interaction`] implementation, so interactive and scripted drivers run
//! the same pipeline. The console implementation blocks on the user, the
//! scripted one replays queued answers.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dialoguer::{Confirm, Select};
use tokio::process::Command;
use tracing::debug;

/// What to do next while a merge sits in conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionChoice {
    /// Run the configured external merge tool
    MergeTool,
    /// Hand the user a shell to resolve and commit by hand
    Manual,
    /// Give up: abort the merge and roll back
    Abort,
    /// Print the conflict diff and ask again
    ShowDiff,
}

#[async_trait]
pub trait Interaction: Send + Sync {
    /// Yes/no question with a default answer
    async fn confirm(&self, question: &str, default: bool) -> bool;

    /// Pick a conflict-resolution strategy
    async fn choose_resolution(&self, conflicted: &[String]) -> ResolutionChoice;

    /// Hand control to the user for manual conflict resolution.
    /// Returns true when the user claims the merge is resolved and committed;
    /// the engine still verifies the repository before believing it.
    async fn resolve_manually(&self) -> bool;
}

/// Terminal prompts via dialoguer
#[derive(Debug, Default)]
pub struct ConsoleInteraction;

#[async_trait]
impl Interaction for ConsoleInteraction {
    async fn confirm(&self, question: &str, default: bool) -> bool {
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .unwrap_or(default)
    }

    async fn choose_resolution(&self, _conflicted: &[String]) -> ResolutionChoice {
        let items = [
            "Open merge tool (if configured)",
            "Manual resolution with editor",
            "Abort merge and rollback",
            "Show conflict details",
        ];
        // Abort when the prompt itself fails (e.g. no tty)
        let picked = Select::new()
            .with_prompt("Choose resolution option")
            .items(&items)
            .default(0)
            .interact()
            .unwrap_or(2);

        match picked {
            0 => ResolutionChoice::MergeTool,
            1 => ResolutionChoice::Manual,
            3 => ResolutionChoice::ShowDiff,
            _ => ResolutionChoice::Abort,
        }
    }

    async fn resolve_manually(&self) -> bool {
        if !self.confirm("Open shell for manual resolution?", true).await {
            return false;
        }

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        debug!(%shell, "handing terminal to user shell");
        let _ = Command::new(shell).status().await;

        self.confirm("Conflicts resolved and committed?", true).await
    }
}

/// Replays queued answers; missing answers fall back to the safe choice
#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    confirms: Mutex<VecDeque<bool>>,
    choices: Mutex<VecDeque<ResolutionChoice>>,
    manual_results: Mutex<VecDeque<bool>>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_confirm(&self, answer: bool) {
        self.confirms.lock().unwrap().push_back(answer);
    }

    pub fn push_choice(&self, choice: ResolutionChoice) {
        self.choices.lock().unwrap().push_back(choice);
    }

    pub fn push_manual(&self, resolved: bool) {
        self.manual_results.lock().unwrap().push_back(resolved);
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    async fn confirm(&self, _question: &str, default: bool) -> bool {
        self.confirms.lock().unwrap().pop_front().unwrap_or(default)
    }

    async fn choose_resolution(&self, _conflicted: &[String]) -> ResolutionChoice {
        self.choices.lock().unwrap().pop_front().unwrap_or(ResolutionChoice::Abort)
    }

    async fn resolve_manually(&self) -> bool {
        self.manual_results.lock().unwrap().pop_front().unwrap_or(false)
    }
}
