//! LeadFive Command-Line Interface
//!
//! Entry point for the `leadfive` binary. Parses command-line arguments
//! and delegates to the command handler.

use leadfive_cli::run_cli;

fn main() -> anyhow::Result<()> {
    run_cli()
}
