//! Withdrawal engine
//!
//! A withdrawal of `amount` splits into a paid-out part and a reinvested
//! part. The rate comes from the direct-referral tier table:
//!
//! | Direct referrals | Withdraw | Reinvest |
//! |------------------|----------|----------|
//! | 0 – 4            | 70%      | 30%      |
//! | 5 – 19           | 75%      | 25%      |
//! | 20+              | 80%      | 20%      |
//!
//! The admin fee is charged on the withdrawn portion only, never on the
//! reinvested part or the gross amount. With auto-compound on, the whole
//! amount is reinvested into the user's own balance plus a 5% bonus that
//! only the earnings cap can limit.
//!
//! Payouts are valued in stable units. They leave custody as the stable
//! token when custody holds enough of it, otherwise as native currency at
//! the aggregated oracle price, rounded down.

use lib_types::{Address, Amount, Bps};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::events::{LedgerEvent, ReinvestTarget, RewardKind};
use crate::gateway::{Asset, TokenGateway};
use crate::math::{bps_of, checked_add, checked_sub, pct_of};
use crate::oracle::stable_to_native_floor;
use crate::pools::PoolKind;
use crate::state::{Env, LedgerTxn};
use crate::user::{day_index, UserAccount};

/// Which asset a withdrawal is paid out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PayoutAsset {
    /// Stable token when custody covers the payout, native otherwise
    #[default]
    Auto,
    Stable,
    Native,
}

/// One row of the withdrawal-rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTier {
    pub min_direct_referrals: u32,
    pub withdraw_pct: u32,
}

impl WithdrawalTier {
    pub fn standard() -> Vec<WithdrawalTier> {
        vec![
            WithdrawalTier { min_direct_referrals: 0, withdraw_pct: 70 },
            WithdrawalTier { min_direct_referrals: 5, withdraw_pct: 75 },
            WithdrawalTier { min_direct_referrals: 20, withdraw_pct: 80 },
        ]
    }

    /// Rows must start at 0 referrals, strictly increase, and stay within 100%
    pub fn validate_table(tiers: &[WithdrawalTier]) -> Result<(), String> {
        match tiers.first() {
            None => return Err("table is empty".to_string()),
            Some(first) if first.min_direct_referrals != 0 => {
                return Err("first tier must start at 0 direct referrals".to_string())
            }
            Some(_) => {}
        }
        for pair in tiers.windows(2) {
            if pair[1].min_direct_referrals <= pair[0].min_direct_referrals {
                return Err("tiers must be sorted by strictly increasing referral count".to_string());
            }
        }
        if let Some(tier) = tiers.iter().find(|t| t.withdraw_pct > 100) {
            return Err(format!("withdraw_pct {} exceeds 100", tier.withdraw_pct));
        }
        Ok(())
    }
}

/// Withdraw percentage for a user with `direct_referrals`
pub fn withdraw_pct_for(direct_referrals: u32, tiers: &[WithdrawalTier]) -> u32 {
    tiers
        .iter()
        .rev()
        .find(|tier| direct_referrals >= tier.min_direct_referrals)
        .map(|tier| tier.withdraw_pct)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSplit {
    pub amount: Amount,
    pub withdraw_pct: u32,
    /// `amount × withdraw_pct / 100`
    pub withdraw_portion: Amount,
    /// `withdraw_portion × admin_fee_bps / 10000`
    pub admin_fee: Amount,
    pub user_receives: Amount,
    pub reinvest_portion: Amount,
    pub auto_compound: bool,
}

impl WithdrawalSplit {
    pub fn compute(amount: Amount, withdraw_pct: u32, admin_fee_bps: Bps, auto_compound: bool) -> LedgerResult<Self> {
        let withdraw_pct = if auto_compound { 0 } else { withdraw_pct.min(100) };
        let withdraw_portion = pct_of(amount, withdraw_pct)?;
        let admin_fee = bps_of(withdraw_portion, admin_fee_bps)?;
        Ok(Self {
            amount,
            withdraw_pct,
            withdraw_portion,
            admin_fee,
            user_receives: checked_sub(withdraw_portion, admin_fee, "withdrawal fee")?,
            reinvest_portion: checked_sub(amount, withdraw_portion, "withdrawal reinvest")?,
            auto_compound,
        })
    }

    /// Split for `user` under `config`, without executing anything
    pub fn for_user(user: &UserAccount, amount: Amount, config: &LedgerConfig) -> LedgerResult<Self> {
        let pct = withdraw_pct_for(user.direct_referral_count, &config.withdrawal_tiers);
        Self::compute(amount, pct, config.admin_fee_bps, user.auto_compound_enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub user: Address,
    pub split: WithdrawalSplit,
    /// Asset the payout and the admin fee left custody in
    pub asset: Asset,
    /// Units of `asset` sent to the user
    pub paid: Amount,
    /// Units of `asset` sent to the treasury
    pub fee_paid: Amount,
    /// Auto-compound bonus actually credited
    pub compound_bonus: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
}

pub(crate) fn withdraw<G: TokenGateway>(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    gateway: &mut G,
    amount: Amount,
    payout: PayoutAsset,
) -> LedgerResult<WithdrawalReceipt> {
    let user = env.ctx.caller;
    let now = env.ctx.now;

    if txn.system().paused {
        return Err(LedgerError::ContractPaused);
    }
    let account = txn.require_user(&user)?;
    if account.is_blacklisted {
        return Err(LedgerError::UserBlacklisted(user));
    }
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    if amount > account.balance {
        return Err(LedgerError::InsufficientBalance {
            available: account.balance,
            requested: amount,
        });
    }

    let split = WithdrawalSplit::for_user(account, amount, env.config)?;
    let balance_before = account.balance;
    let withdrawn_today = account.withdrawn_on_day_of(now);

    // Circuit breaker over the rolling window
    let threshold = txn.system().circuit_breaker_threshold;
    if threshold > 0 && split.withdraw_portion > 0 {
        let window_total = checked_add(txn.window_outflow(now), split.withdraw_portion, "breaker window")?;
        if window_total > threshold {
            warn!("circuit breaker refused withdrawal of {} by {}", amount, user);
            return Err(LedgerError::CircuitBreakerTripped {
                window_total,
                threshold,
            });
        }
    }

    if let Some(limit) = txn.system().daily_withdrawal_limit {
        if checked_add(withdrawn_today, amount, "daily withdrawals")? > limit {
            return Err(LedgerError::DailyLimitExceeded {
                used: withdrawn_today,
                requested: amount,
                limit,
            });
        }
    }

    // Debit
    {
        let account = txn.user_mut(&user)?;
        account.balance -= amount;
        account.total_withdrawn = checked_add(account.total_withdrawn, split.withdraw_portion, "total withdrawn")?;
        account.last_withdrawal_at = Some(now);
        account.withdrawal_day = day_index(now);
        account.withdrawn_today = checked_add(withdrawn_today, amount, "daily withdrawals")?;
    }

    // Payouts
    let treasury = txn.system().treasury;
    let (asset, fee_paid, paid) = payout_units(txn, env, gateway, &split, payout)?;
    if fee_paid > 0 {
        gateway
            .push(asset, &treasury, fee_paid)
            .map_err(LedgerError::PayoutFailed)?;
    }
    if split.admin_fee > 0 {
        let system = txn.system_mut();
        system.total_admin_fees = checked_add(system.total_admin_fees, split.admin_fee, "admin fees")?;
        txn.emit(LedgerEvent::AdminFeeCollected {
            user,
            treasury,
            amount: split.admin_fee,
        });
    }
    if paid > 0 {
        gateway
            .push(asset, &user, paid)
            .map_err(LedgerError::PayoutFailed)?;
    }
    if split.withdraw_portion > 0 {
        txn.record_outflow(&user, split.withdraw_portion, now)?;
    }
    txn.emit(LedgerEvent::Withdrawal {
        user,
        amount,
        withdrawn: split.withdraw_portion,
        received: split.user_receives,
        asset,
        paid,
    });

    // Reinvestment
    let mut compound_bonus = 0;
    if split.reinvest_portion > 0 {
        if split.auto_compound {
            compound_bonus = compound(txn, env, &user, &split)?;
            txn.emit(LedgerEvent::ReinvestmentProcessed {
                user,
                amount: split.reinvest_portion,
                target: ReinvestTarget::AutoCompound,
            });
        } else {
            txn.accrue_pool(PoolKind::Community, split.reinvest_portion)?;
            txn.emit(LedgerEvent::ReinvestmentProcessed {
                user,
                amount: split.reinvest_portion,
                target: ReinvestTarget::CommunityPool,
            });
        }
    }

    let balance_after = txn.require_user(&user)?.balance;
    info!(
        "withdrawal by {}: amount {}, paid {}, fee {}, reinvested {}",
        user, amount, split.user_receives, split.admin_fee, split.reinvest_portion
    );
    Ok(WithdrawalReceipt {
        user,
        split,
        asset,
        paid,
        fee_paid,
        compound_bonus,
        balance_before,
        balance_after,
    })
}

/// Pick the payout asset and convert the fee and the user's share into its
/// units. Returns `(asset, fee_units, user_units)`.
fn payout_units<G: TokenGateway>(
    txn: &LedgerTxn<'_>,
    env: &Env<'_>,
    gateway: &G,
    split: &WithdrawalSplit,
    payout: PayoutAsset,
) -> LedgerResult<(Asset, Amount, Amount)> {
    let asset = match payout {
        PayoutAsset::Stable => Asset::Stable,
        PayoutAsset::Native => Asset::Native,
        PayoutAsset::Auto => {
            let held = gateway.custody_balance(Asset::Stable);
            if held >= split.withdraw_portion || txn.system().oracles.is_empty() {
                Asset::Stable
            } else {
                debug!("stable custody {} short of {}, paying native", held, split.withdraw_portion);
                Asset::Native
            }
        }
    };
    match asset {
        Asset::Stable => Ok((Asset::Stable, split.admin_fee, split.user_receives)),
        Asset::Native => {
            let quote = env.native_quote(txn.system())?;
            let decimals = env.config.token_decimals;
            let fee = stable_to_native_floor(split.admin_fee, decimals, &quote, &env.config.oracle)?;
            let paid = stable_to_native_floor(split.user_receives, decimals, &quote, &env.config.oracle)?;
            Ok((Asset::Native, fee, paid))
        }
    }
}

/// Return the reinvested principal to the balance and credit the bonus.
/// The principal was already earned, so it does not count against the cap
/// again; the bonus is a new credit and is clamped to the cap headroom.
fn compound(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    user: &Address,
    split: &WithdrawalSplit,
) -> LedgerResult<Amount> {
    {
        let account = txn.user_mut(user)?;
        account.balance = checked_add(account.balance, split.reinvest_portion, "compound principal")?;
    }

    let bonus = pct_of(split.reinvest_portion, env.config.auto_compound_bonus_pct)?;
    if bonus == 0 {
        return Ok(0);
    }
    let outcome = txn.credit_user(user, bonus, RewardKind::CompoundBonus, None)?;
    if outcome.forfeited > 0 {
        debug!("compound bonus for {} clamped by {}", user, outcome.forfeited);
    }
    Ok(outcome.credited)
}

/// Toggle auto-compound for `ctx.caller`
pub(crate) fn set_auto_compound(txn: &mut LedgerTxn<'_>, env: &Env<'_>, enabled: bool) -> LedgerResult<()> {
    let user = env.ctx.caller;
    let account = txn.user_mut(&user)?;
    if account.auto_compound_enabled == enabled {
        return Ok(());
    }
    account.auto_compound_enabled = enabled;
    txn.emit(LedgerEvent::AutoCompoundChanged { user, enabled });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;
    const E17: u128 = E18 / 10;

    #[test]
    fn test_fee_charged_on_withdrawn_portion_only() {
        let split = WithdrawalSplit::compute(100 * E18, 70, 500, false).unwrap();
        assert_eq!(split.withdraw_portion, 70 * E18);
        assert_eq!(split.admin_fee, 35 * E17);
        assert_eq!(split.user_receives, 665 * E17);
        assert_eq!(split.reinvest_portion, 30 * E18);
        // Not 5% of the full amount
        assert_ne!(split.admin_fee, 5 * E18);
    }

    #[test]
    fn test_tier_boundaries() {
        let tiers = WithdrawalTier::standard();
        let rates: Vec<u32> = [4, 5, 19, 20].iter().map(|n| withdraw_pct_for(*n, &tiers)).collect();
        assert_eq!(rates, vec![70, 75, 75, 80]);
        assert_eq!(withdraw_pct_for(0, &tiers), 70);
        assert_eq!(withdraw_pct_for(1_000, &tiers), 80);
    }

    #[test]
    fn test_tier_splits_at_boundaries() {
        let tiers = WithdrawalTier::standard();
        for (referrals, withdraw, reinvest) in [(4, 70, 30), (5, 75, 25), (19, 75, 25), (20, 80, 20)] {
            let pct = withdraw_pct_for(referrals, &tiers);
            let split = WithdrawalSplit::compute(100, pct, 500, false).unwrap();
            assert_eq!(split.withdraw_portion, withdraw, "referrals={}", referrals);
            assert_eq!(split.reinvest_portion, reinvest, "referrals={}", referrals);
        }
    }

    #[test]
    fn test_auto_compound_reinvests_everything() {
        let split = WithdrawalSplit::compute(100 * E18, 70, 500, true).unwrap();
        assert_eq!(split.withdraw_portion, 0);
        assert_eq!(split.admin_fee, 0);
        assert_eq!(split.user_receives, 0);
        assert_eq!(split.reinvest_portion, 100 * E18);
    }

    #[test]
    fn test_tier_table_validation() {
        assert!(WithdrawalTier::validate_table(&WithdrawalTier::standard()).is_ok());
        assert!(WithdrawalTier::validate_table(&[]).is_err());
        assert!(WithdrawalTier::validate_table(&[WithdrawalTier { min_direct_referrals: 1, withdraw_pct: 70 }]).is_err());
        assert!(WithdrawalTier::validate_table(&[
            WithdrawalTier { min_direct_referrals: 0, withdraw_pct: 70 },
            WithdrawalTier { min_direct_referrals: 0, withdraw_pct: 75 },
        ])
        .is_err());
        assert!(WithdrawalTier::validate_table(&[WithdrawalTier { min_direct_referrals: 0, withdraw_pct: 101 }]).is_err());
    }

    #[test]
    fn test_for_user_uses_referral_count() {
        let config = LedgerConfig::default();
        let mut user = UserAccount::new_member(Address::new([1; 20]), Address::new([2; 20]), 1, 0);
        user.direct_referral_count = 20;
        let split = WithdrawalSplit::for_user(&user, 100, &config).unwrap();
        assert_eq!(split.withdraw_pct, 80);
        user.auto_compound_enabled = true;
        assert_eq!(WithdrawalSplit::for_user(&user, 100, &config).unwrap().withdraw_pct, 0);
    }
}
