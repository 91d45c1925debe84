//! User-facing output as an injected capability
//!
//! Engines report through [`Reporter`] instead of printing directly, so
//! tests capture output without patching global state. Diagnostic logging
//! stays on `tracing` and goes to the log file, never the terminal.

use std::sync::Mutex;

use colored::Colorize;

pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Verbatim block output (diffs, commit logs)
    fn detail(&self, block: &str);
}

/// Colored stdout reporter used by the CLI
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", message.green());
    }

    fn warn(&self, message: &str) {
        println!("{}", message.yellow());
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message.red());
    }

    fn detail(&self, block: &str) {
        println!("{}", block);
    }
}

/// Collects output lines for assertions
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    fn push(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

impl Reporter for MemoryReporter {
    fn info(&self, message: &str) {
        self.push(message);
    }

    fn success(&self, message: &str) {
        self.push(message);
    }

    fn warn(&self, message: &str) {
        self.push(message);
    }

    fn error(&self, message: &str) {
        self.push(message);
    }

    fn detail(&self, block: &str) {
        self.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_captures_in_order() {
        let reporter = MemoryReporter::new();
        reporter.info("first");
        reporter.warn("second");
        reporter.error("third");

        assert_eq!(reporter.lines(), vec!["first", "second", "third"]);
        assert!(reporter.contains("second"));
        assert!(!reporter.contains("fourth"));
    }
}
