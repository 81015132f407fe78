//! Output abstraction
//!
//! Commands print through [`Output`] so tests can capture what an operator
//! would see.

use crate::error::CliResult;

pub trait Output: Send + Sync {
    fn print(&self, msg: &str) -> CliResult<()>;

    fn print_json(&self, data: &serde_json::Value) -> CliResult<()> {
        self.print(&serde_json::to_string_pretty(data)?)
    }

    fn error(&self, msg: &str) -> CliResult<()>;

    fn success(&self, msg: &str) -> CliResult<()> {
        self.print(&format!("OK  {}", msg))
    }

    fn warning(&self, msg: &str) -> CliResult<()> {
        self.print(&format!("WARN {}", msg))
    }

    /// One `key value` row, aligned with the other rows of a report
    fn field(&self, key: &str, value: &str) -> CliResult<()> {
        self.print(&format!("  {:<22} {}", key, value))
    }

    fn header(&self, title: &str) -> CliResult<()> {
        self.print(&format!("\n{}\n{}", title, "-".repeat(title.len())))
    }
}

/// Writes to stdout, errors to stderr
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn print(&self, msg: &str) -> CliResult<()> {
        println!("{}", msg);
        Ok(())
    }

    fn error(&self, msg: &str) -> CliResult<()> {
        eprintln!("error: {}", msg);
        Ok(())
    }
}
