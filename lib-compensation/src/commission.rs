//! Commission engine
//!
//! Splits an incoming package payment `P` across the plan:
//!
//! 1. Direct bonus to the sponsor: `P × direct_bps / 10000`
//! 2. Level bonus: `P × level_bps / (10000 × depth)` to each of the nearest
//!    `depth` ancestors (default 10)
//! 3. Upline bonus: `P × upline_bps / 10000` shared equally by however many
//!    of the nearest 30 ancestors exist
//! 4. Leadership / Community / Club pools by their bp shares
//!
//! Every credit is clamped to the recipient's cap headroom. Clamp excess,
//! blacklisted recipients, missing ancestors and integer-division dust all
//! land in the Community pool, so
//!
//! ```text
//! direct + Σ level + Σ upline + Σ pools + forfeited == P
//! ```
//!
//! holds exactly for every payment.

use lib_types::{Address, Amount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Package, PackageTier};
use crate::config::UpgradePricing;
use crate::errors::{LedgerError, LedgerResult, SponsorRejection};
use crate::events::{ForfeitReason, LedgerEvent, RewardKind};
use crate::gateway::{Asset, TokenGateway};
use crate::math::{bps_of, checked_add, checked_sub, mul_div};
use crate::oracle::stable_to_native;
use crate::pools::PoolKind;
use crate::referral::{ancestors_of, find_matrix_slot, full_chain, MatrixPlacement, ReferralEdge, MAX_CHAIN_DEPTH};
use crate::state::{Env, LedgerTxn};
use crate::user::UserAccount;

/// How the caller pays for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaymentMethod {
    #[default]
    Stable,
    /// Native currency at the oracle price
    Native,
}

/// Pool share of one payment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCredits {
    pub leadership: Amount,
    pub community: Amount,
    pub club: Amount,
}

impl PoolCredits {
    pub fn total(&self) -> LedgerResult<Amount> {
        let sum = checked_add(self.leadership, self.community, "pool credits")?;
        checked_add(sum, self.club, "pool credits")
    }
}

/// Where every unit of one payment went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    /// Stable-token value being split
    pub amount: Amount,
    pub direct_credit: Amount,
    pub level_credits: Amount,
    pub upline_credits: Amount,
    /// Fixed bp allocations only
    pub pool_credits: PoolCredits,
    /// Sent to the Community pool on top of its bp allocation
    pub forfeited_to_community: Amount,
}

impl CommissionBreakdown {
    /// Sum of every bucket; equals `amount` for a committed payment
    pub fn accounted(&self) -> LedgerResult<Amount> {
        let mut total = checked_add(self.direct_credit, self.level_credits, "breakdown")?;
        total = checked_add(total, self.upline_credits, "breakdown")?;
        total = checked_add(total, self.pool_credits.total()?, "breakdown")?;
        checked_add(total, self.forfeited_to_community, "breakdown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    /// Value in stable-token base units
    pub stable_value: Amount,
    /// Units actually pulled (differs from `stable_value` for native payments)
    pub pulled: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub user: Address,
    pub sponsor: Address,
    pub tier: PackageTier,
    pub payment: Payment,
    pub breakdown: CommissionBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    pub user: Address,
    pub from_tier: PackageTier,
    pub to_tier: PackageTier,
    pub payment: Payment,
    pub breakdown: CommissionBreakdown,
}

/// Register `ctx.caller` under `sponsor` with a `tier` package
pub(crate) fn register<G: TokenGateway>(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    gateway: &mut G,
    sponsor: Address,
    tier: PackageTier,
    method: PaymentMethod,
) -> LedgerResult<Registration> {
    let user = env.ctx.caller;
    if txn.system().paused {
        return Err(LedgerError::ContractPaused);
    }
    if user.is_zero() {
        return Err(LedgerError::InvalidAddress("zero address cannot register"));
    }
    if user == sponsor {
        return Err(LedgerError::InvalidSponsor {
            sponsor,
            reason: SponsorRejection::SelfReferral,
        });
    }
    if txn.is_registered(&user) {
        return Err(LedgerError::AlreadyRegistered(user));
    }
    match txn.user(&sponsor) {
        None => {
            return Err(LedgerError::InvalidSponsor {
                sponsor,
                reason: SponsorRejection::NotRegistered,
            })
        }
        Some(account) if account.is_blacklisted => {
            return Err(LedgerError::InvalidSponsor {
                sponsor,
                reason: SponsorRejection::Blacklisted,
            })
        }
        Some(_) => {}
    }
    let package = *env.catalog.require(tier)?;

    let payment = collect_payment(txn, env, gateway, &user, package.price, method)?;

    let mut account = UserAccount::new_member(user, sponsor, tier, env.ctx.now);
    account.record_investment(payment.stable_value, env.config.earnings_cap_multiplier)?;
    txn.insert_user(account);
    txn.add_edge(ReferralEdge {
        sponsor,
        referred: user,
        created_at: env.ctx.now,
    });
    txn.system_mut().total_users += 1;
    txn.emit(LedgerEvent::UserRegistered {
        user,
        sponsor,
        tier,
        amount: payment.stable_value,
    });
    place_in_matrix(txn, env, &user, &sponsor)?;

    let breakdown = distribute_payment(txn, env, &user, &package, payment.stable_value)?;
    record_team_growth(txn, env, &user, &sponsor)?;

    info!(
        "registered {} under {} at tier {} ({} paid)",
        user, sponsor, tier, payment.stable_value
    );
    Ok(Registration {
        user,
        sponsor,
        tier,
        payment,
        breakdown,
    })
}

/// Move `ctx.caller` to a higher tier
pub(crate) fn upgrade_package<G: TokenGateway>(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    gateway: &mut G,
    new_tier: PackageTier,
    method: PaymentMethod,
) -> LedgerResult<Upgrade> {
    let user = env.ctx.caller;
    if txn.system().paused {
        return Err(LedgerError::ContractPaused);
    }
    let account = txn.require_user(&user)?;
    if account.is_blacklisted {
        return Err(LedgerError::UserBlacklisted(user));
    }
    let current_tier = account.package_level;
    if new_tier <= current_tier {
        return Err(LedgerError::TierNotHigher {
            current: current_tier,
            requested: new_tier,
        });
    }
    let package = *env.catalog.require(new_tier)?;
    let current_price = env.catalog.get(current_tier).map(|p| p.price).unwrap_or(0);

    let charge = match env.config.upgrade_pricing {
        UpgradePricing::Incremental => checked_sub(package.price, current_price, "upgrade delta")?,
        UpgradePricing::FullPrice => package.price,
    };
    if charge == 0 {
        return Err(LedgerError::ZeroAmount);
    }

    let payment = collect_payment(txn, env, gateway, &user, charge, method)?;
    {
        let account = txn.user_mut(&user)?;
        account.package_level = new_tier;
        account.record_investment(payment.stable_value, env.config.earnings_cap_multiplier)?;
    }
    txn.emit(LedgerEvent::PackageUpgraded {
        user,
        from_tier: current_tier,
        to_tier: new_tier,
        amount: payment.stable_value,
    });

    let breakdown = distribute_payment(txn, env, &user, &package, payment.stable_value)?;

    info!(
        "upgraded {} from tier {} to {} ({} paid)",
        user, current_tier, new_tier, payment.stable_value
    );
    Ok(Upgrade {
        user,
        from_tier: current_tier,
        to_tier: new_tier,
        payment,
        breakdown,
    })
}

/// Pull `stable_value` worth of tokens from `payer`
fn collect_payment<G: TokenGateway>(
    txn: &LedgerTxn<'_>,
    env: &Env<'_>,
    gateway: &mut G,
    payer: &Address,
    stable_value: Amount,
    method: PaymentMethod,
) -> LedgerResult<Payment> {
    let system = txn.system();
    let (asset, pulled) = match method {
        PaymentMethod::Stable => (Asset::Stable, stable_value),
        PaymentMethod::Native => {
            let quote = env.native_quote(system)?;
            let native = stable_to_native(stable_value, env.config.token_decimals, &quote, &env.config.oracle)?;
            debug!("native payment: {} stable = {} native at {}", stable_value, native, quote.price);
            (Asset::Native, native)
        }
    };
    gateway
        .pull(asset, payer, pulled)
        .map_err(LedgerError::PaymentFailed)?;
    Ok(Payment {
        method,
        stable_value,
        pulled,
    })
}

/// Split `amount` paid by `payer` according to `package`
pub(crate) fn distribute_payment(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    payer: &Address,
    package: &Package,
    amount: Amount,
) -> LedgerResult<CommissionBreakdown> {
    let mut breakdown = CommissionBreakdown {
        amount,
        ..Default::default()
    };
    let ancestors = ancestors_of(&*txn, payer, MAX_CHAIN_DEPTH);

    // Direct bonus
    let direct = bps_of(amount, package.direct_bonus_bps)?;
    match ancestors.get(0) {
        Some(sponsor) => {
            let (credited, forfeited) = reward(txn, &sponsor, direct, RewardKind::Direct, payer)?;
            breakdown.direct_credit = credited;
            breakdown.forfeited_to_community = checked_add(breakdown.forfeited_to_community, forfeited, "forfeit")?;
        }
        None => {
            forfeit(txn, None, direct, ForfeitReason::MissingAncestor);
            breakdown.forfeited_to_community = checked_add(breakdown.forfeited_to_community, direct, "forfeit")?;
        }
    }

    // Level bonus, equal share per level
    let depth = env.config.level_bonus_depth.min(MAX_CHAIN_DEPTH);
    let per_level = mul_div(
        amount,
        Amount::from(package.level_bonus_bps),
        BPS_DENOMINATOR * depth as Amount,
    )?;
    if per_level > 0 {
        for level in 0..depth {
            let kind = RewardKind::Level { depth: (level + 1) as u8 };
            match ancestors.get(level) {
                Some(ancestor) => {
                    let (credited, forfeited) = reward(txn, &ancestor, per_level, kind, payer)?;
                    breakdown.level_credits = checked_add(breakdown.level_credits, credited, "level credits")?;
                    breakdown.forfeited_to_community =
                        checked_add(breakdown.forfeited_to_community, forfeited, "forfeit")?;
                }
                None => {
                    forfeit(txn, None, per_level, ForfeitReason::MissingAncestor);
                    breakdown.forfeited_to_community =
                        checked_add(breakdown.forfeited_to_community, per_level, "forfeit")?;
                }
            }
        }
    }

    // Upline bonus, shared by the ancestors that exist
    let upline_total = bps_of(amount, package.upline_bonus_bps)?;
    let upline = ancestors.nearest(env.config.upline_bonus_depth);
    if upline.is_empty() {
        if upline_total > 0 {
            forfeit(txn, None, upline_total, ForfeitReason::MissingAncestor);
        }
        breakdown.forfeited_to_community =
            checked_add(breakdown.forfeited_to_community, upline_total, "forfeit")?;
    } else {
        let each = upline_total / upline.len() as Amount;
        if each > 0 {
            for ancestor in upline {
                let (credited, forfeited) = reward(txn, ancestor, each, RewardKind::Upline, payer)?;
                breakdown.upline_credits = checked_add(breakdown.upline_credits, credited, "upline credits")?;
                breakdown.forfeited_to_community =
                    checked_add(breakdown.forfeited_to_community, forfeited, "forfeit")?;
            }
        }
        // Shortfall and division remainder fall through to the dust sweep
    }

    // Pool allocations
    breakdown.pool_credits = PoolCredits {
        leadership: bps_of(amount, package.leader_pool_bps)?,
        community: bps_of(amount, package.help_pool_bps)?,
        club: bps_of(amount, package.club_pool_bps)?,
    };

    // Truncation dust
    let allocated = breakdown.accounted()?;
    if allocated > amount {
        return Err(LedgerError::ConservationViolated {
            distributed: allocated,
            amount,
        });
    }
    let dust = amount - allocated;
    if dust > 0 {
        forfeit(txn, None, dust, ForfeitReason::RoundingDust);
        breakdown.forfeited_to_community = checked_add(breakdown.forfeited_to_community, dust, "forfeit")?;
    }

    txn.accrue_pool(PoolKind::Leadership, breakdown.pool_credits.leadership)?;
    txn.accrue_pool(PoolKind::Club, breakdown.pool_credits.club)?;
    let community = checked_add(
        breakdown.pool_credits.community,
        breakdown.forfeited_to_community,
        "community accrual",
    )?;
    txn.accrue_pool(PoolKind::Community, community)?;

    debug_assert_eq!(breakdown.accounted().ok(), Some(amount));
    debug!(
        "split {}: direct {}, level {}, upline {}, forfeited {}",
        amount,
        breakdown.direct_credit,
        breakdown.level_credits,
        breakdown.upline_credits,
        breakdown.forfeited_to_community
    );
    Ok(breakdown)
}

/// Credit a reward and route any refused part to the Community pool.
/// Returns `(credited, forfeited)`.
fn reward(
    txn: &mut LedgerTxn<'_>,
    recipient: &Address,
    amount: Amount,
    kind: RewardKind,
    source: &Address,
) -> LedgerResult<(Amount, Amount)> {
    let blacklisted = txn.user(recipient).is_some_and(|u| u.is_blacklisted);
    let outcome = txn.credit_user(recipient, amount, kind, Some(*source))?;
    if outcome.forfeited > 0 {
        let reason = if blacklisted {
            ForfeitReason::Blacklisted
        } else {
            ForfeitReason::CapReached
        };
        forfeit(txn, Some(*recipient), outcome.forfeited, reason);
    }
    Ok((outcome.credited, outcome.forfeited))
}

fn forfeit(txn: &mut LedgerTxn<'_>, intended: Option<Address>, amount: Amount, reason: ForfeitReason) {
    txn.emit(LedgerEvent::Forfeited {
        intended,
        amount,
        reason,
    });
}

/// Seat `user` in the placement matrix below `sponsor`
fn place_in_matrix(txn: &mut LedgerTxn<'_>, env: &Env<'_>, user: &Address, sponsor: &Address) -> LedgerResult<()> {
    let (parent, side) = find_matrix_slot(&*txn, sponsor).ok_or(LedgerError::MatrixCorrupted(*sponsor))?;
    txn.add_placement(MatrixPlacement {
        user: *user,
        parent,
        side,
        placed_at: env.ctx.now,
    });
    txn.emit(LedgerEvent::MatrixPlaced {
        user: *user,
        parent,
        side,
    });
    debug!("{} seated {} of {}", user, side, parent);
    Ok(())
}

/// A new referral joined below `sponsor`: bump direct count and every
/// ancestor's team size, then re-evaluate ranks.
fn record_team_growth(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    user: &Address,
    sponsor: &Address,
) -> LedgerResult<()> {
    {
        let account = txn.user_mut(sponsor)?;
        account.direct_referral_count = account
            .direct_referral_count
            .checked_add(1)
            .ok_or(LedgerError::Overflow("direct referral count"))?;
    }

    for ancestor in full_chain(&*txn, user) {
        let account = txn.user_mut(&ancestor)?;
        account.team_size = account
            .team_size
            .checked_add(1)
            .ok_or(LedgerError::Overflow("team size"))?;
        if let Some((from, to)) = account.refresh_rank(&env.config.ranks) {
            info!("{} promoted from {} to {}", ancestor, from, to);
            txn.emit(LedgerEvent::RankChanged {
                user: ancestor,
                from,
                to,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_accounting() {
        let breakdown = CommissionBreakdown {
            amount: 100,
            direct_credit: 40,
            level_credits: 10,
            upline_credits: 5,
            pool_credits: PoolCredits { leadership: 10, community: 30, club: 0 },
            forfeited_to_community: 5,
        };
        assert_eq!(breakdown.accounted().unwrap(), 100);
    }
}
