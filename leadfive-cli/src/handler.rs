//! Command dispatch

use std::time::{SystemTime, UNIX_EPOCH};

use lib_compensation::{LedgerConfig, Timestamp};
use tracing::debug;

use crate::argument_parsing::{LeadFiveCli, LeadFiveCommand};
use crate::commands::{admin, member, pools, CommandContext};
use crate::error::{CliError, CliResult};
use crate::output::Output;

fn current_time(at: Option<u64>) -> CliResult<Timestamp> {
    match at {
        Some(at) => Ok(at),
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|e| CliError::Other(format!("system clock before unix epoch: {}", e))),
    }
}

fn load_config(cli: &LeadFiveCli) -> CliResult<LedgerConfig> {
    match &cli.config {
        Some(path) => {
            debug!("loading ledger config from {}", path.display());
            Ok(LedgerConfig::load(path)?)
        }
        None => Ok(LedgerConfig::default()),
    }
}

/// Run `cli.command`; errors are printed through `output` and returned
pub fn execute(cli: &LeadFiveCli, output: &dyn Output) -> CliResult<()> {
    let result = dispatch(cli, output);
    if let Err(e) = &result {
        output.error(&e.to_string())?;
    }
    result
}

fn dispatch(cli: &LeadFiveCli, output: &dyn Output) -> CliResult<()> {
    let ctx = CommandContext::new(
        cli.data_dir.clone(),
        load_config(cli)?,
        cli.format,
        current_time(cli.at)?,
        output,
    )?;

    match &cli.command {
        LeadFiveCommand::Init(args) => admin::init(&ctx, args),
        LeadFiveCommand::Mint(args) => member::mint(&ctx, args),
        LeadFiveCommand::Register(args) => member::register(&ctx, args),
        LeadFiveCommand::Upgrade(args) => member::upgrade(&ctx, args),
        LeadFiveCommand::Withdraw(args) => member::withdraw(&ctx, args),
        LeadFiveCommand::Distribute(args) => pools::distribute(&ctx, args),
        LeadFiveCommand::AutoCompound(args) => member::auto_compound(&ctx, args),
        LeadFiveCommand::Pause(args) => admin::pause(&ctx, args),
        LeadFiveCommand::Unpause(args) => admin::unpause(&ctx, args),
        LeadFiveCommand::SetTreasury(args) => admin::set_treasury(&ctx, args),
        LeadFiveCommand::SetCircuitBreaker(args) => admin::set_circuit_breaker(&ctx, args),
        LeadFiveCommand::SetDailyLimit(args) => admin::set_daily_limit(&ctx, args),
        LeadFiveCommand::SetDistributionPolicy(args) => admin::set_distribution_policy(&ctx, args),
        LeadFiveCommand::AddAdmin(args) => admin::set_admin(&ctx, args, true),
        LeadFiveCommand::RemoveAdmin(args) => admin::set_admin(&ctx, args, false),
        LeadFiveCommand::Blacklist(args) => admin::blacklist(&ctx, args, true),
        LeadFiveCommand::Unblacklist(args) => admin::blacklist(&ctx, args, false),
        LeadFiveCommand::ShowUser(args) => member::show_user(&ctx, args),
        LeadFiveCommand::ShowPools => pools::show_pools(&ctx),
        LeadFiveCommand::AddOracle(args) => admin::set_oracle(&ctx, args, true),
        LeadFiveCommand::RemoveOracle(args) => admin::set_oracle(&ctx, args, false),
        LeadFiveCommand::SetMinOracles(args) => admin::set_min_oracles(&ctx, args),
        LeadFiveCommand::Health => pools::show_health(&ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::MockOutput;
    use clap::Parser;
    use std::path::Path;

    const OWNER: &str = "0xa0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0";
    const ROOT: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
    const TREASURY: &str = "0xa2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2";
    const ALICE: &str = "0x0101010101010101010101010101010101010101";
    const GENESIS: &str = "1700000000";

    fn run(dir: &Path, args: &[&str]) -> (CliResult<()>, MockOutput) {
        let dir = dir.to_string_lossy().to_string();
        let mut argv = vec!["leadfive", "--data-dir", dir.as_str(), "--at", GENESIS];
        argv.extend_from_slice(args);
        let cli = LeadFiveCli::try_parse_from(argv).unwrap();
        let output = MockOutput::new();
        let result = execute(&cli, &output);
        (result, output)
    }

    fn init(dir: &Path) {
        let (result, _) = run(dir, &["init", "--owner", OWNER, "--root", ROOT, "--treasury", TREASURY]);
        result.unwrap();
    }

    #[test]
    fn test_command_before_init_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let (result, output) = run(dir.path(), &["show-pools"]);
        assert!(matches!(result, Err(CliError::NotInitialized(_))));
        assert_eq!(output.errors().len(), 1);
    }

    #[test]
    fn test_register_flow_persists_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, _) = run(dir.path(), &["mint", "--to", ALICE, "--amount", "30"]);
        result.unwrap();

        let (result, output) = run(
            dir.path(),
            &["register", "--user", ALICE, "--sponsor", ROOT, "--tier", "1"],
        );
        result.unwrap();
        output.assert_contains_message("direct");
        output.assert_contains_message("registered");

        let (result, output) = run(dir.path(), &["--format", "json", "show-user", "--user", ALICE]);
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.transcript()).unwrap();
        assert_eq!(json["package_tier"], "1");
        assert_eq!(json["total_invested"], "30");
        assert_eq!(json["wallet_stable"], "0");
    }

    #[test]
    fn test_unfunded_registration_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, _) = run(
            dir.path(),
            &["register", "--user", ALICE, "--sponsor", ROOT, "--tier", "1"],
        );
        assert!(matches!(result, Err(CliError::Ledger(_))));

        let (result, output) = run(dir.path(), &["--format", "json", "show-pools"]);
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.transcript()).unwrap();
        assert_eq!(json["total_users"], "1");
        assert_eq!(json["community.balance"], "0");
    }

    #[test]
    fn test_pause_requires_admin() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, _) = run(dir.path(), &["pause", "--caller", ALICE]);
        assert!(result.is_err());

        let (result, output) = run(dir.path(), &["pause", "--caller", OWNER]);
        result.unwrap();
        output.assert_contains_message("paused by");
    }

    #[test]
    fn test_health_reports_oracles_and_breaker() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, output) = run(dir.path(), &["--format", "json", "health"]);
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.transcript()).unwrap();
        assert_eq!(json["operational"], "true");
        assert_eq!(json["approved_oracles"], "1");
        assert_eq!(json["min_oracles"], "1");

        let (result, output) = run(
            dir.path(),
            &["set-min-oracles", "--caller", OWNER, "--min-oracles", "2"],
        );
        result.unwrap();
        output.assert_contains_message("2 price feeds required");
    }

    #[test]
    fn test_native_registration_and_payout() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, _) = run(dir.path(), &["mint", "--to", ALICE, "--amount", "1", "--native"]);
        result.unwrap();
        let (result, output) = run(
            dir.path(),
            &["register", "--user", ALICE, "--sponsor", ROOT, "--tier", "1", "--native-price", "300"],
        );
        result.unwrap();
        output.assert_contains_message("native");

        // Root's 15.3 of credits, custody holds no stable token
        let (result, output) = run(
            dir.path(),
            &["--format", "json", "withdraw", "--user", ROOT, "--amount", "10", "--native-price", "300"],
        );
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.transcript()).unwrap();
        assert_eq!(json["payout_asset"], "native");
    }

    #[test]
    fn test_distribute_before_interval_is_not_due() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());

        let (result, output) = run(dir.path(), &["distribute", "--pool", "club", "--caller", ALICE]);
        result.unwrap();
        output.assert_contains_message("not due until");
    }
}
