//! Pool distribution and inspection

use lib_compensation::{CallContext, DistributionOutcome, PoolKind};

use crate::argument_parsing::DistributeArgs;
use crate::error::{CliError, CliResult};
use crate::logic::{format_amount, parse_address};

use super::{CommandContext, Report};

fn selected_pools(input: &str) -> CliResult<Vec<PoolKind>> {
    if input.eq_ignore_ascii_case("all") {
        return Ok(PoolKind::ALL.to_vec());
    }
    input
        .parse::<PoolKind>()
        .map(|kind| vec![kind])
        .map_err(CliError::InvalidArgument)
}

fn describe_outcome(outcome: &DistributionOutcome, decimals: u8) -> String {
    match outcome {
        DistributionOutcome::Distributed {
            distributed,
            recipients,
            carried_forward,
        } => format!(
            "distributed {} to {} recipients, {} carried forward",
            format_amount(*distributed, decimals),
            recipients,
            format_amount(*carried_forward, decimals)
        ),
        DistributionOutcome::NotDue { next_due_at } => format!("not due until {}", next_due_at),
        DistributionOutcome::NoEligibleRecipients { carried_forward } => format!(
            "no eligible recipients, {} carried forward",
            format_amount(*carried_forward, decimals)
        ),
        DistributionOutcome::EmptyPool => "pool empty".to_string(),
    }
}

/// Each pool is its own ledger operation; one failing stops the rest
pub fn distribute(ctx: &CommandContext<'_>, args: &DistributeArgs) -> CliResult<()> {
    let kinds = selected_pools(&args.pool)?;
    let mut workspace = ctx.open_workspace()?;
    let caller = parse_address(&args.caller)?;
    let decimals = workspace.decimals();

    let mut report = Report::new("distribute");
    for kind in kinds {
        let receipt = workspace
            .ledger
            .trigger_distribution(CallContext::new(caller, ctx.now), kind)?;
        workspace.save()?;
        report = report
            .field(kind.display_name(), describe_outcome(&receipt.value, decimals))
            .events(&receipt.events, decimals);
    }
    report.render(ctx.format, ctx.output)
}

pub fn show_health(ctx: &CommandContext<'_>) -> CliResult<()> {
    let workspace = ctx.open_workspace()?;
    let decimals = workspace.decimals();
    let native_decimals = workspace.ledger.config().oracle.native_decimals;
    let health = workspace.ledger.system_health(ctx.now);

    Report::new("health")
        .field("operational", health.operational)
        .field("paused", health.paused)
        .field("circuit_breaker_tripped", health.circuit_breaker_tripped)
        .field("window_outflow", format_amount(health.window_outflow, decimals))
        .field("total_users", health.total_users)
        .field("total_admin_fees", format_amount(health.total_admin_fees, decimals))
        .field("liabilities", format_amount(health.liabilities, decimals))
        .field("custody_stable", format_amount(health.custody_stable, decimals))
        .field("custody_native", format_amount(health.custody_native, native_decimals))
        .field("approved_oracles", health.approved_oracles)
        .field("min_oracles", health.min_oracles)
        .render(ctx.format, ctx.output)
}

pub fn show_pools(ctx: &CommandContext<'_>) -> CliResult<()> {
    let workspace = ctx.open_workspace()?;
    let decimals = workspace.decimals();

    let mut report = Report::new("pools");
    for pool in workspace.ledger.pools().iter() {
        let name = pool.kind.display_name();
        report = report
            .field(&format!("{}.balance", name), format_amount(pool.balance, decimals))
            .field(&format!("{}.next_due_at", name), pool.next_due_at())
            .field(&format!("{}.due_now", name), pool.is_due(ctx.now))
            .field(
                &format!("{}.lifetime_distributed", name),
                format_amount(pool.total_distributed_lifetime, decimals),
            )
            .field(&format!("{}.distributions", name), pool.distribution_count);
    }
    report
        .field("total_users", workspace.ledger.total_users())
        .render(ctx.format, ctx.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_pools() {
        assert_eq!(selected_pools("all").unwrap().len(), 3);
        assert_eq!(selected_pools("help").unwrap(), vec![PoolKind::Community]);
        assert!(matches!(selected_pools("vip"), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_not_due_description() {
        let text = describe_outcome(&DistributionOutcome::NotDue { next_due_at: 99 }, 18);
        assert_eq!(text, "not due until 99");
    }
}
