//! Participant commands: funding, registration, upgrades and withdrawals

use lib_compensation::{
    Address, Asset, CallContext, CommissionBreakdown, FixedPriceOracle, Payment, PaymentMethod, PayoutAsset, Timestamp,
};
use tracing::info;

use crate::argument_parsing::{
    AutoCompoundArgs, MintArgs, PaymentArgs, PayoutArg, RegisterArgs, ShowUserArgs, UpgradeArgs, WithdrawArgs,
};
use crate::error::{CliError, CliResult};
use crate::logic::{format_amount, parse_address, parse_amount};

use super::workspace::{Workspace, SANDBOX_FEED};
use super::{CommandContext, Report};

/// USD prices are quoted with 8 decimals
const ORACLE_PRICE_DECIMALS: u8 = 8;

/// Attach a fixed quote behind the sandbox feed; returns whether one was given
fn attach_price(workspace: &mut Workspace, args: &PaymentArgs, now: Timestamp) -> CliResult<bool> {
    match &args.native_price {
        None => Ok(false),
        Some(price) => {
            let price = parse_amount(price, ORACLE_PRICE_DECIMALS)?;
            workspace
                .ledger
                .attach_price_feed(SANDBOX_FEED, Box::new(FixedPriceOracle::new(price, now)));
            Ok(true)
        }
    }
}

fn payment_method(workspace: &mut Workspace, args: &PaymentArgs, now: Timestamp) -> CliResult<PaymentMethod> {
    if attach_price(workspace, args, now)? {
        Ok(PaymentMethod::Native)
    } else {
        Ok(PaymentMethod::Stable)
    }
}

fn asset_name(asset: Asset) -> &'static str {
    match asset {
        Asset::Stable => "stable",
        Asset::Native => "native",
    }
}

fn payment_fields(report: Report, workspace: &Workspace, payment: &Payment, breakdown: &CommissionBreakdown) -> Report {
    let decimals = workspace.decimals();
    let pulled = match payment.method {
        PaymentMethod::Stable => format!("{} stable", format_amount(payment.pulled, decimals)),
        PaymentMethod::Native => format!(
            "{} native",
            format_amount(payment.pulled, workspace.ledger.config().oracle.native_decimals)
        ),
    };
    let amt = |a| format_amount(a, decimals);
    report
        .field("paid", pulled)
        .field("value", amt(payment.stable_value))
        .field("direct", amt(breakdown.direct_credit))
        .field("level", amt(breakdown.level_credits))
        .field("upline", amt(breakdown.upline_credits))
        .field("leadership_pool", amt(breakdown.pool_credits.leadership))
        .field("community_pool", amt(breakdown.pool_credits.community))
        .field("club_pool", amt(breakdown.pool_credits.club))
        .field("forfeited", amt(breakdown.forfeited_to_community))
}

pub fn mint(ctx: &CommandContext<'_>, args: &MintArgs) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let to = parse_address(&args.to)?;
    let (asset, decimals) = if args.native {
        (Asset::Native, workspace.ledger.config().oracle.native_decimals)
    } else {
        (Asset::Stable, workspace.decimals())
    };
    let amount = parse_amount(&args.amount, decimals)?;

    workspace
        .ledger
        .gateway_mut()
        .mint(asset, &to, amount)
        .map_err(|e| CliError::Sandbox(e.to_string()))?;
    workspace.save()?;
    info!("minted {} {:?} to {}", amount, asset, to);

    let balance = workspace.ledger.gateway().balance_of(asset, &to);
    Report::new("mint")
        .field("account", to)
        .field("asset", asset_name(asset))
        .field("minted", format_amount(amount, decimals))
        .field("wallet_balance", format_amount(balance, decimals))
        .render(ctx.format, ctx.output)
}

pub fn register(ctx: &CommandContext<'_>, args: &RegisterArgs) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let user = parse_address(&args.user)?;
    let sponsor = parse_address(&args.sponsor)?;
    let method = payment_method(&mut workspace, &args.payment, ctx.now)?;

    let receipt = workspace
        .ledger
        .register(CallContext::new(user, ctx.now), sponsor, args.tier, method)?;
    workspace.save()?;

    let registration = receipt.value;
    let report = Report::new("register")
        .field("user", registration.user)
        .field("sponsor", registration.sponsor)
        .field("tier", registration.tier);
    payment_fields(report, &workspace, &registration.payment, &registration.breakdown)
        .events(&receipt.events, workspace.decimals())
        .render(ctx.format, ctx.output)
}

pub fn upgrade(ctx: &CommandContext<'_>, args: &UpgradeArgs) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let user = parse_address(&args.user)?;
    let method = payment_method(&mut workspace, &args.payment, ctx.now)?;

    let receipt = workspace
        .ledger
        .upgrade_package(CallContext::new(user, ctx.now), args.tier, method)?;
    workspace.save()?;

    let upgrade = receipt.value;
    let report = Report::new("upgrade")
        .field("user", upgrade.user)
        .field("from_tier", upgrade.from_tier)
        .field("to_tier", upgrade.to_tier);
    payment_fields(report, &workspace, &upgrade.payment, &upgrade.breakdown)
        .events(&receipt.events, workspace.decimals())
        .render(ctx.format, ctx.output)
}

pub fn withdraw(ctx: &CommandContext<'_>, args: &WithdrawArgs) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let user = parse_address(&args.user)?;
    let decimals = workspace.decimals();
    let amount = parse_amount(&args.amount, decimals)?;
    attach_price(&mut workspace, &args.payment, ctx.now)?;
    let payout = match args.payout {
        PayoutArg::Auto => PayoutAsset::Auto,
        PayoutArg::Stable => PayoutAsset::Stable,
        PayoutArg::Native => PayoutAsset::Native,
    };

    let receipt = workspace
        .ledger
        .withdraw_in(CallContext::new(user, ctx.now), amount, payout)?;
    workspace.save()?;

    let w = receipt.value;
    let amt = |a| format_amount(a, decimals);
    let paid_decimals = match w.asset {
        Asset::Stable => decimals,
        Asset::Native => workspace.ledger.config().oracle.native_decimals,
    };
    Report::new("withdraw")
        .field("user", w.user)
        .field("amount", amt(w.split.amount))
        .field("withdraw_rate", format!("{}%", w.split.withdraw_pct))
        .field("admin_fee", amt(w.split.admin_fee))
        .field("received", amt(w.split.user_receives))
        .field("payout_asset", asset_name(w.asset))
        .field("paid", format_amount(w.paid, paid_decimals))
        .field("fee_paid", format_amount(w.fee_paid, paid_decimals))
        .field("reinvested", amt(w.split.reinvest_portion))
        .field("auto_compound", w.split.auto_compound)
        .field("compound_bonus", amt(w.compound_bonus))
        .field("balance_before", amt(w.balance_before))
        .field("balance_after", amt(w.balance_after))
        .events(&receipt.events, decimals)
        .render(ctx.format, ctx.output)
}

pub fn auto_compound(ctx: &CommandContext<'_>, args: &AutoCompoundArgs) -> CliResult<()> {
    let mut workspace = ctx.open_workspace()?;
    let user = parse_address(&args.user)?;

    let receipt = workspace
        .ledger
        .set_auto_compound(CallContext::new(user, ctx.now), args.enabled)?;
    workspace.save()?;

    Report::new("auto-compound")
        .field("user", user)
        .field("enabled", args.enabled)
        .events(&receipt.events, workspace.decimals())
        .render(ctx.format, ctx.output)
}

pub fn show_user(ctx: &CommandContext<'_>, args: &ShowUserArgs) -> CliResult<()> {
    let workspace = ctx.open_workspace()?;
    let address = parse_address(&args.user)?;
    let decimals = workspace.decimals();
    let ledger = &workspace.ledger;

    let account = ledger
        .user(&address)
        .ok_or(lib_compensation::LedgerError::NotRegistered(address))?;
    let amt = |a| format_amount(a, decimals);
    let sponsor = account
        .sponsor
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let last_withdrawal = account
        .last_withdrawal_at
        .map(|t| t.to_string())
        .unwrap_or_else(|| "never".to_string());
    let matrix_seat = ledger
        .matrix_position(&address)
        .map(|seat| format!("{} of {}", seat.side, seat.parent))
        .unwrap_or_else(|| "-".to_string());
    let [left, right] = ledger.matrix_children(&address);
    let seat = |child: Option<Address>| child.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());

    Report::new("user")
        .field("address", account.address)
        .field("sponsor", sponsor)
        .field("package_tier", account.package_level)
        .field("rank", account.rank)
        .field("balance", amt(account.balance))
        .field("total_invested", amt(account.total_invested))
        .field("total_earned", amt(account.total_earned))
        .field("earnings_cap", amt(account.earnings_cap))
        .field("total_withdrawn", amt(account.total_withdrawn))
        .field("direct_referrals", account.direct_referral_count)
        .field("team_size", account.team_size)
        .field("blacklisted", account.is_blacklisted)
        .field("auto_compound", account.auto_compound_enabled)
        .field("registered_at", account.registered_at)
        .field("last_withdrawal_at", last_withdrawal)
        .field("matrix_seat", matrix_seat)
        .field("matrix_left", seat(left))
        .field("matrix_right", seat(right))
        .field("wallet_stable", amt(ledger.gateway().balance_of(Asset::Stable, &address)))
        .render(ctx.format, ctx.output)
}
