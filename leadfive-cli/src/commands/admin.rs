//! Setup and operator controls

use lib_compensation::{CallContext, DistributionPolicy, GenesisParams, LedgerEvent};

use crate::argument_parsing::{
    AdminArgs, BlacklistArgs, CallerArgs, InitArgs, OracleArgs, PolicyArg, SetCircuitBreakerArgs,
    SetDailyLimitArgs, SetDistributionPolicyArgs, SetMinOraclesArgs, SetTreasuryArgs,
};
use crate::error::CliResult;
use crate::logic::{format_amount, parse_address, parse_amount};

use super::workspace::{Workspace, SANDBOX_FEED};
use super::{CommandContext, Report};

pub fn init(ctx: &CommandContext<'_>, args: &InitArgs) -> CliResult<()> {
    let params = GenesisParams {
        owner: parse_address(&args.owner)?,
        root: parse_address(&args.root)?,
        treasury: parse_address(&args.treasury)?,
        oracle: Some(SANDBOX_FEED),
        now: ctx.now,
    };
    let workspace = Workspace::init(ctx.paths.clone(), ctx.config.clone(), params)?;
    let catalog = workspace.ledger.package_catalog();
    let decimals = workspace.decimals();

    let mut report = Report::new("init")
        .field("data_dir", ctx.paths.root.display())
        .field("owner", params.owner)
        .field("root", params.root)
        .field("treasury", params.treasury)
        .field("price_feed", SANDBOX_FEED)
        .field("genesis_at", params.now);
    for package in catalog.iter() {
        report = report.field(&format!("tier_{}", package.tier), format_amount(package.price, decimals));
    }
    report.render(ctx.format, ctx.output)
}

/// Run one caller-authorized operation and report its events
fn simple(
    ctx: &CommandContext<'_>,
    title: &str,
    caller: &str,
    op: impl FnOnce(&mut Workspace, CallContext) -> CliResult<Vec<LedgerEvent>>,
) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let caller = parse_address(caller)?;
    let events = op(&mut workspace, CallContext::new(caller, ctx.now))?;
    workspace.save()?;

    Report::new(title)
        .field("caller", caller)
        .events(&events, workspace.decimals())
        .render(ctx.format, ctx.output)
}

pub fn pause(ctx: &CommandContext<'_>, args: &CallerArgs) -> CliResult<()> {
    simple(ctx, "pause", &args.caller, |w, call| Ok(w.ledger.pause(call)?.events))
}

pub fn unpause(ctx: &CommandContext<'_>, args: &CallerArgs) -> CliResult<()> {
    simple(ctx, "unpause", &args.caller, |w, call| Ok(w.ledger.unpause(call)?.events))
}

pub fn set_treasury(ctx: &CommandContext<'_>, args: &SetTreasuryArgs) -> CliResult<()> {
    let treasury = parse_address(&args.treasury)?;
    simple(ctx, "set-treasury", &args.caller, |w, call| {
        Ok(w.ledger.set_treasury(call, treasury)?.events)
    })
}

pub fn set_circuit_breaker(ctx: &CommandContext<'_>, args: &SetCircuitBreakerArgs) -> CliResult<()> {
    let threshold = parse_amount(&args.threshold, ctx.config.token_decimals)?;
    simple(ctx, "set-circuit-breaker", &args.caller, |w, call| {
        Ok(w.ledger.set_circuit_breaker(call, threshold, args.window_secs)?.events)
    })
}

pub fn blacklist(ctx: &CommandContext<'_>, args: &BlacklistArgs, blacklisted: bool) -> CliResult<()> {
    let user = parse_address(&args.user)?;
    let title = if blacklisted { "blacklist" } else { "unblacklist" };
    simple(ctx, title, &args.caller, |w, call| {
        let receipt = if blacklisted {
            w.ledger.blacklist(call, user)?
        } else {
            w.ledger.unblacklist(call, user)?
        };
        Ok(receipt.events)
    })
}

pub fn set_daily_limit(ctx: &CommandContext<'_>, args: &SetDailyLimitArgs) -> CliResult<()> {
    let limit = match &args.limit {
        Some(limit) => Some(parse_amount(limit, ctx.config.token_decimals)?),
        None => None,
    };
    simple(ctx, "set-daily-limit", &args.caller, |w, call| {
        Ok(w.ledger.set_daily_withdrawal_limit(call, limit)?.events)
    })
}

pub fn set_distribution_policy(ctx: &CommandContext<'_>, args: &SetDistributionPolicyArgs) -> CliResult<()> {
    let policy = match args.policy {
        PolicyArg::Permissionless => DistributionPolicy::Permissionless,
        PolicyArg::AdminOnly => DistributionPolicy::AdminOnly,
    };
    simple(ctx, "set-distribution-policy", &args.caller, |w, call| {
        Ok(w.ledger.set_distribution_policy(call, policy)?.events)
    })
}

pub fn set_admin(ctx: &CommandContext<'_>, args: &AdminArgs, add: bool) -> CliResult<()> {
    let admin = parse_address(&args.admin)?;
    let title = if add { "add-admin" } else { "remove-admin" };
    simple(ctx, title, &args.caller, |w, call| {
        let receipt = if add {
            w.ledger.add_admin(call, admin)?
        } else {
            w.ledger.remove_admin(call, admin)?
        };
        Ok(receipt.events)
    })
}

pub fn set_oracle(ctx: &CommandContext<'_>, args: &OracleArgs, add: bool) -> CliResult<()> {
    let oracle = parse_address(&args.oracle)?;
    let title = if add { "add-oracle" } else { "remove-oracle" };
    simple(ctx, title, &args.caller, |w, call| {
        let receipt = if add {
            w.ledger.add_oracle(call, oracle)?
        } else {
            w.ledger.remove_oracle(call, oracle)?
        };
        Ok(receipt.events)
    })
}

pub fn set_min_oracles(ctx: &CommandContext<'_>, args: &SetMinOraclesArgs) -> CliResult<()> {
    simple(ctx, "set-min-oracles", &args.caller, |w, call| {
        Ok(w.ledger.set_min_oracles(call, args.min_oracles)?.events)
    })
}
