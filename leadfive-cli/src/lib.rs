//! LeadFive CLI Library
//!
//! Operator surface over a persistent compensation ledger directory.
//!
//! ## Architecture
//!
//! - **Pure logic** (`logic/`): amount parsing and formatting, data-dir
//!   layout, event descriptions
//! - **Commands** (`commands/`): open the ledger, run one operation, render
//!   the report
//! - **Errors** (`error`): `CliError` wrapping ledger, config and storage
//!   failures
//! - **Output** (`output`): printing trait so commands stay testable

pub mod argument_parsing;
pub mod commands;
pub mod error;
pub mod handler;
pub mod logic;
pub mod output;

pub use argument_parsing::{run_cli, LeadFiveCli, LeadFiveCommand, OutputFormat};
pub use error::{CliError, CliResult};
pub use output::Output;

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
