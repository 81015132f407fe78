//! One-line operator descriptions of ledger events

use lib_compensation::{Asset, ForfeitReason, LedgerEvent, ReinvestTarget};

use super::amounts::format_amount;

fn forfeit_reason(reason: ForfeitReason) -> &'static str {
    match reason {
        ForfeitReason::CapReached => "earnings cap reached",
        ForfeitReason::Blacklisted => "recipient blacklisted",
        ForfeitReason::MissingAncestor => "no ancestor at that depth",
        ForfeitReason::RoundingDust => "rounding remainder",
    }
}

fn reinvest_target(target: ReinvestTarget) -> &'static str {
    match target {
        ReinvestTarget::CommunityPool => "community pool",
        ReinvestTarget::AutoCompound => "own balance (auto-compound)",
    }
}

/// `decimals` is the stable token's precision
pub fn describe_event(event: &LedgerEvent, decimals: u8) -> String {
    let amt = |a| format_amount(a, decimals);
    match event {
        LedgerEvent::UserRegistered { user, sponsor, tier, amount } => {
            format!("registered {} under {} at tier {} for {}", user, sponsor, tier, amt(*amount))
        }
        LedgerEvent::PackageUpgraded { user, from_tier, to_tier, amount } => {
            format!("upgraded {} from tier {} to {} for {}", user, from_tier, to_tier, amt(*amount))
        }
        LedgerEvent::RewardCredited { recipient, source, kind, amount } => match source {
            Some(source) => format!("{} reward {} to {} from {}", kind, amt(*amount), recipient, source),
            None => format!("{} reward {} to {}", kind, amt(*amount), recipient),
        },
        LedgerEvent::EarningsCapReached { user, cap } => {
            format!("{} reached earnings cap {}", user, amt(*cap))
        }
        LedgerEvent::Forfeited { intended, amount, reason } => match intended {
            Some(user) => format!(
                "forfeited {} meant for {} to community ({})",
                amt(*amount),
                user,
                forfeit_reason(*reason)
            ),
            None => format!("forfeited {} to community ({})", amt(*amount), forfeit_reason(*reason)),
        },
        LedgerEvent::PoolCredited { pool, amount } => format!("{} pool +{}", pool, amt(*amount)),
        LedgerEvent::Withdrawal { user, amount, withdrawn, received, asset, .. } => format!(
            "{} withdrew {}: {} paid out, {} received in {}",
            user,
            amt(*amount),
            amt(*withdrawn),
            amt(*received),
            match asset {
                Asset::Stable => "stable",
                Asset::Native => "native",
            }
        ),
        LedgerEvent::AdminFeeCollected { user, treasury, amount } => {
            format!("admin fee {} from {} to {}", amt(*amount), user, treasury)
        }
        LedgerEvent::ReinvestmentProcessed { user, amount, target } => {
            format!("reinvested {} of {} into {}", amt(*amount), user, reinvest_target(*target))
        }
        LedgerEvent::PoolDistributed { pool, distributed, recipients, carried_forward, .. } => format!(
            "{} pool paid {} to {} recipients, {} carried forward",
            pool,
            amt(*distributed),
            recipients,
            amt(*carried_forward)
        ),
        LedgerEvent::RankChanged { user, from, to } => format!("{} rank {} -> {}", user, from, to),
        LedgerEvent::AutoCompoundChanged { user, enabled } => {
            format!("auto-compound {} for {}", if *enabled { "on" } else { "off" }, user)
        }
        LedgerEvent::Paused { by } => format!("paused by {}", by),
        LedgerEvent::Unpaused { by } => format!("unpaused by {}", by),
        LedgerEvent::TreasuryUpdated { old, new } => format!("treasury {} -> {}", old, new),
        LedgerEvent::CircuitBreakerUpdated { threshold, window_secs } => {
            if *threshold == 0 {
                "circuit breaker disabled".to_string()
            } else {
                format!("circuit breaker set to {} per {}s", amt(*threshold), window_secs)
            }
        }
        LedgerEvent::DailyLimitUpdated { limit } => match limit {
            Some(limit) => format!("daily withdrawal limit set to {}", amt(*limit)),
            None => "daily withdrawal limit removed".to_string(),
        },
        LedgerEvent::DistributionPolicyUpdated { policy } => {
            format!("distribution policy set to {:?}", policy)
        }
        LedgerEvent::Blacklisted { user } => format!("{} blacklisted", user),
        LedgerEvent::Unblacklisted { user } => format!("{} removed from blacklist", user),
        LedgerEvent::AdminAdded { admin } => format!("admin {} added", admin),
        LedgerEvent::AdminRemoved { admin } => format!("admin {} removed", admin),
        LedgerEvent::MatrixPlaced { user, parent, side } => {
            format!("{} seated {} of {}", user, side, parent)
        }
        LedgerEvent::OracleAdded { oracle } => format!("price feed {} approved", oracle),
        LedgerEvent::OracleRemoved { oracle } => format!("price feed {} removed", oracle),
        LedgerEvent::MinOraclesUpdated { min_oracles } => {
            format!("{} price feeds required", min_oracles)
        }
    }
}
