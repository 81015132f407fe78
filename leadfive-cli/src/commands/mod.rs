//! Command implementations
//!
//! Each command opens the workspace, runs one ledger operation, saves the
//! token book and prints a [`Report`].

pub mod admin;
pub mod member;
pub mod pools;
pub mod workspace;

use std::path::PathBuf;

use lib_compensation::{LedgerConfig, LedgerEvent, Timestamp};
use serde_json::{Map, Value};

use crate::argument_parsing::OutputFormat;
use crate::error::CliResult;
use crate::logic::{describe_event, DataPaths};
use crate::output::Output;

use workspace::Workspace;

/// Everything a command needs besides its own arguments
pub struct CommandContext<'a> {
    pub paths: DataPaths,
    pub config: LedgerConfig,
    pub format: OutputFormat,
    pub now: Timestamp,
    pub output: &'a dyn Output,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        config: LedgerConfig,
        format: OutputFormat,
        now: Timestamp,
        output: &'a dyn Output,
    ) -> CliResult<Self> {
        Ok(Self {
            paths: DataPaths::new(data_dir.into())?,
            config,
            format,
            now,
            output,
        })
    }

    pub fn open_workspace(&self) -> CliResult<Workspace> {
        Workspace::open(self.paths.clone(), self.config.clone())
    }
}

/// Key/value summary of a command plus the events it produced
#[derive(Debug, Clone, Default)]
pub struct Report {
    title: String,
    fields: Vec<(String, String)>,
    events: Vec<String>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    pub fn events(mut self, events: &[LedgerEvent], decimals: u8) -> Self {
        self.events.extend(events.iter().map(|e| describe_event(e, decimals)));
        self
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("command".to_string(), Value::String(self.title.clone()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), Value::String(value.clone()));
        }
        if !self.events.is_empty() {
            object.insert(
                "events".to_string(),
                Value::Array(self.events.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(object)
    }

    pub fn render(&self, format: OutputFormat, output: &dyn Output) -> CliResult<()> {
        match format {
            OutputFormat::Json => output.print_json(&self.to_json()),
            OutputFormat::Text => {
                output.header(&self.title)?;
                for (key, value) in &self.fields {
                    output.field(key, value)?;
                }
                if !self.events.is_empty() {
                    output.print("  events:")?;
                    for line in &self.events {
                        output.print(&format!("    - {}", line))?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::MockOutput;
    use lib_compensation::{Address, PoolKind};

    #[test]
    fn test_report_json_shape() {
        let report = Report::new("withdraw")
            .field("amount", "100")
            .events(&[LedgerEvent::PoolCredited { pool: PoolKind::Community, amount: 30 }], 0);
        let json = report.to_json();
        assert_eq!(json["command"], "withdraw");
        assert_eq!(json["amount"], "100");
        assert_eq!(json["events"][0], "community pool +30");
    }

    #[test]
    fn test_report_text_lists_events() {
        let output = MockOutput::new();
        Report::new("pause")
            .events(&[LedgerEvent::Paused { by: Address::new([1; 20]) }], 18)
            .render(OutputFormat::Text, &output)
            .unwrap();
        output.assert_contains_message("events:");
        output.assert_contains_message("paused by 0x0101");
    }
}
