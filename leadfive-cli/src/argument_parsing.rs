//! LeadFive CLI arguments
//!
//! Global options select the ledger directory, configuration file, output
//! format and log level; each subcommand maps to one ledger operation.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::handler;
use crate::output::ConsoleOutput;

/// LeadFive compensation ledger operator CLI
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "leadfive")]
pub struct LeadFiveCli {
    /// Ledger directory (sled store and sandbox token book)
    #[arg(short, long, default_value = "./leadfive-data", env = "LEADFIVE_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Ledger configuration file (TOML); defaults apply when omitted
    #[arg(short, long, env = "LEADFIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, env = "LEADFIVE_FORMAT")]
    pub format: OutputFormat,

    /// Log filter (e.g. `info`, `lib_compensation=debug`); overrides RUST_LOG
    #[arg(long, env = "LEADFIVE_LOG")]
    pub log_level: Option<String>,

    /// Unix timestamp to execute at instead of the system clock
    #[arg(long, global = true)]
    pub at: Option<u64>,

    #[command(subcommand)]
    pub command: LeadFiveCommand,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LeadFiveCommand {
    /// Create a new ledger with its root account
    Init(InitArgs),

    /// Credit sandbox tokens to an external account
    Mint(MintArgs),

    /// Register a participant under a sponsor
    Register(RegisterArgs),

    /// Move a participant to a higher package
    Upgrade(UpgradeArgs),

    /// Withdraw from a participant balance
    Withdraw(WithdrawArgs),

    /// Trigger pool distribution
    Distribute(DistributeArgs),

    /// Turn auto-compound on or off for a participant
    AutoCompound(AutoCompoundArgs),

    /// Halt registrations, upgrades and withdrawals
    Pause(CallerArgs),

    /// Resume normal operation
    Unpause(CallerArgs),

    /// Change the admin-fee recipient
    SetTreasury(SetTreasuryArgs),

    /// Configure the withdrawal circuit breaker
    SetCircuitBreaker(SetCircuitBreakerArgs),

    /// Cap gross withdrawals per participant per UTC day
    SetDailyLimit(SetDailyLimitArgs),

    /// Choose who may trigger pool distributions
    SetDistributionPolicy(SetDistributionPolicyArgs),

    /// Grant admin rights (owner only)
    AddAdmin(AdminArgs),

    /// Revoke admin rights (owner only)
    RemoveAdmin(AdminArgs),

    /// Block a participant
    Blacklist(BlacklistArgs),

    /// Unblock a participant
    Unblacklist(BlacklistArgs),

    /// Show one participant
    ShowUser(ShowUserArgs),

    /// Show pool balances and schedules
    ShowPools,

    /// Approve a price feed (admin)
    AddOracle(OracleArgs),

    /// Withdraw approval of a price feed (admin)
    RemoveOracle(OracleArgs),

    /// Number of valid price feeds a native quote needs (admin)
    SetMinOracles(SetMinOraclesArgs),

    /// Show pause, circuit-breaker, custody and oracle status
    Health,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Owner (first admin) address
    #[arg(long)]
    pub owner: String,

    /// Root account address
    #[arg(long)]
    pub root: String,

    /// Admin-fee recipient address
    #[arg(long)]
    pub treasury: String,
}

#[derive(Args, Debug, Clone)]
pub struct MintArgs {
    #[arg(long)]
    pub to: String,

    /// Whole tokens, decimals allowed (e.g. `30` or `0.5`)
    #[arg(long)]
    pub amount: String,

    /// Mint native currency instead of the stable token
    #[arg(long)]
    pub native: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PaymentArgs {
    /// Pay in native currency at this USD price per native unit
    #[arg(long, value_name = "USD")]
    pub native_price: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub sponsor: String,

    /// Package tier (1-based)
    #[arg(long)]
    pub tier: u8,

    #[command(flatten)]
    pub payment: PaymentArgs,
}

#[derive(Args, Debug, Clone)]
pub struct UpgradeArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub tier: u8,

    #[command(flatten)]
    pub payment: PaymentArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayoutArg {
    /// Stable when custody covers it, native otherwise
    #[default]
    Auto,
    Stable,
    Native,
}

#[derive(Args, Debug, Clone)]
pub struct WithdrawArgs {
    #[arg(long)]
    pub user: String,

    /// Whole tokens, decimals allowed
    #[arg(long)]
    pub amount: String,

    #[arg(long, value_enum, default_value_t = PayoutArg::Auto)]
    pub payout: PayoutArg,

    #[command(flatten)]
    pub payment: PaymentArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DistributeArgs {
    /// `leadership`, `community`, `club` or `all`
    #[arg(long, default_value = "all")]
    pub pool: String,

    #[arg(long)]
    pub caller: String,
}

#[derive(Args, Debug, Clone)]
pub struct AutoCompoundArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long, action = clap::ArgAction::Set)]
    pub enabled: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CallerArgs {
    /// Admin address issuing the command
    #[arg(long)]
    pub caller: String,
}

#[derive(Args, Debug, Clone)]
pub struct SetTreasuryArgs {
    #[arg(long)]
    pub caller: String,

    #[arg(long)]
    pub treasury: String,
}

#[derive(Args, Debug, Clone)]
pub struct SetCircuitBreakerArgs {
    #[arg(long)]
    pub caller: String,

    /// Maximum outflow per window in whole tokens; 0 disables
    #[arg(long)]
    pub threshold: String,

    #[arg(long, default_value_t = 86_400)]
    pub window_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SetDailyLimitArgs {
    #[arg(long)]
    pub caller: String,

    /// Whole tokens per day; omit to remove the limit
    #[arg(long)]
    pub limit: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Permissionless,
    AdminOnly,
}

#[derive(Args, Debug, Clone)]
pub struct SetDistributionPolicyArgs {
    #[arg(long)]
    pub caller: String,

    #[arg(long, value_enum)]
    pub policy: PolicyArg,
}

#[derive(Args, Debug, Clone)]
pub struct AdminArgs {
    /// Owner address
    #[arg(long)]
    pub caller: String,

    #[arg(long)]
    pub admin: String,
}

#[derive(Args, Debug, Clone)]
pub struct OracleArgs {
    #[arg(long)]
    pub caller: String,

    /// Price feed id
    #[arg(long)]
    pub oracle: String,
}

#[derive(Args, Debug, Clone)]
pub struct SetMinOraclesArgs {
    #[arg(long)]
    pub caller: String,

    #[arg(long)]
    pub min_oracles: u32,
}

#[derive(Args, Debug, Clone)]
pub struct BlacklistArgs {
    #[arg(long)]
    pub caller: String,

    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug, Clone)]
pub struct ShowUserArgs {
    #[arg(long)]
    pub user: String,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // Logs go to stderr so JSON output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse arguments, install logging and run the command. A failed command
/// has already been reported on stderr and exits with status 1.
pub fn run_cli() -> Result<()> {
    let cli = LeadFiveCli::parse();
    init_logging(cli.log_level.as_deref());
    if handler::execute(&cli, &ConsoleOutput).is_err() {
        std::process::exit(1);
    }
    Ok(())
}
