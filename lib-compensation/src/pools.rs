//! Pool manager
//!
//! Three shared reservoirs accrue bp shares of every payment (plus every
//! forfeiture, for Community). They only drain through an explicit,
//! caller-triggered distribution once per interval.
//!
//! # Eligibility and weights
//!
//! | Pool       | Eligible                         | Weight           |
//! |------------|----------------------------------|------------------|
//! | Leadership | rank >= Shining Star             | 1 (Shining), 2 (Silver) |
//! | Community  | `total_invested > 0`             | `total_invested` |
//! | Club       | `package_level >= club_min_tier` | 1                |
//!
//! Blacklisted, capped-out and root accounts are never eligible. Shares go
//! through the cap clamp; whatever is not credited (clamp excess, rounding
//! dust) stays in the pool for the next round.

use std::fmt;

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DistributionPolicy, LedgerConfig};
use crate::errors::{LedgerError, LedgerResult};
use crate::events::{LedgerEvent, RewardKind};
use crate::math::{checked_add, checked_sub, mul_div};
use crate::state::{Env, LedgerTxn};
use crate::user::UserAccount;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PoolKind {
    Leadership = 1,
    Community = 2,
    Club = 3,
}

impl PoolKind {
    pub const ALL: &'static [PoolKind] = &[PoolKind::Leadership, PoolKind::Community, PoolKind::Club];

    pub fn display_name(&self) -> &'static str {
        match self {
            PoolKind::Leadership => "leadership",
            PoolKind::Community => "community",
            PoolKind::Club => "club",
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PoolKind::Leadership),
            2 => Some(PoolKind::Community),
            3 => Some(PoolKind::Club),
            _ => None,
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leadership" | "leader" => Ok(PoolKind::Leadership),
            "community" | "help" => Ok(PoolKind::Community),
            "club" => Ok(PoolKind::Club),
            other => Err(format!("unknown pool '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub kind: PoolKind,
    pub balance: Amount,
    pub last_distribution_at: Timestamp,
    pub interval_secs: u64,
    pub total_distributed_lifetime: Amount,
    pub distribution_count: u64,
}

impl Pool {
    pub fn new(kind: PoolKind, interval_secs: u64, created_at: Timestamp) -> Self {
        Self {
            kind,
            balance: 0,
            last_distribution_at: created_at,
            interval_secs,
            total_distributed_lifetime: 0,
            distribution_count: 0,
        }
    }

    pub fn next_due_at(&self) -> Timestamp {
        self.last_distribution_at.saturating_add(self.interval_secs)
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.next_due_at()
    }

    pub fn accrue(&mut self, amount: Amount) -> LedgerResult<()> {
        self.balance = checked_add(self.balance, amount, "pool balance")?;
        Ok(())
    }
}

/// One pool of each kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSet {
    pub leadership: Pool,
    pub community: Pool,
    pub club: Pool,
}

impl PoolSet {
    pub fn new(config: &LedgerConfig, created_at: Timestamp) -> Self {
        let pool = |kind| Pool::new(kind, config.pools.interval(kind), created_at);
        Self {
            leadership: pool(PoolKind::Leadership),
            community: pool(PoolKind::Community),
            club: pool(PoolKind::Club),
        }
    }

    pub fn get(&self, kind: PoolKind) -> &Pool {
        match kind {
            PoolKind::Leadership => &self.leadership,
            PoolKind::Community => &self.community,
            PoolKind::Club => &self.club,
        }
    }

    pub fn get_mut(&mut self, kind: PoolKind) -> &mut Pool {
        match kind {
            PoolKind::Leadership => &mut self.leadership,
            PoolKind::Community => &mut self.community,
            PoolKind::Club => &mut self.club,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        [&self.leadership, &self.community, &self.club].into_iter()
    }

    /// Replace a pool record (used when loading from storage)
    pub fn set(&mut self, pool: Pool) {
        *self.get_mut(pool.kind) = pool;
    }

    pub fn total_balance(&self) -> Amount {
        self.iter().fold(0u128, |acc, pool| acc.saturating_add(pool.balance))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionOutcome {
    Distributed {
        distributed: Amount,
        recipients: u64,
        carried_forward: Amount,
    },
    /// Interval has not elapsed; nothing changed
    NotDue { next_due_at: Timestamp },
    /// Nobody qualified; balance carried forward, timestamp advanced
    NoEligibleRecipients { carried_forward: Amount },
    /// Pool was empty; timestamp advanced
    EmptyPool,
}

/// Distribution weight of `user` in `kind`, zero when ineligible
pub fn eligibility_weight(kind: PoolKind, user: &UserAccount, config: &LedgerConfig) -> u128 {
    if user.is_root() || user.is_blacklisted || user.is_capped_out() {
        return 0;
    }
    match kind {
        PoolKind::Leadership => user.rank.leadership_weight(),
        PoolKind::Community => user.total_invested,
        PoolKind::Club => u128::from(user.package_level >= config.club_min_tier),
    }
}

/// Distribute `kind` if due. See the module docs for the weighting rules.
pub(crate) fn trigger_distribution(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    kind: PoolKind,
) -> LedgerResult<DistributionOutcome> {
    if txn.system().distribution_policy == DistributionPolicy::AdminOnly
        && !txn.system().is_admin(&env.ctx.caller)
    {
        return Err(LedgerError::Unauthorized(env.ctx.caller));
    }

    let pool = *txn.pool(kind);
    if !pool.is_due(env.ctx.now) {
        debug!("{} pool not due until {}", kind, pool.next_due_at());
        return Ok(DistributionOutcome::NotDue {
            next_due_at: pool.next_due_at(),
        });
    }

    if pool.balance == 0 {
        advance(txn, kind, env.ctx.now);
        return Ok(DistributionOutcome::EmptyPool);
    }

    let mut eligible: Vec<(Address, u128)> = txn
        .users()
        .map(|user| (user.address, eligibility_weight(kind, user, env.config)))
        .filter(|(_, weight)| *weight > 0)
        .collect();
    eligible.sort_by_key(|(address, _)| *address);

    let total_weight = eligible
        .iter()
        .try_fold(0u128, |acc, (_, weight)| acc.checked_add(*weight))
        .ok_or(LedgerError::Overflow("pool weights"))?;

    if total_weight == 0 {
        advance(txn, kind, env.ctx.now);
        info!("{} pool: no eligible recipients, carrying {} forward", kind, pool.balance);
        return Ok(DistributionOutcome::NoEligibleRecipients {
            carried_forward: pool.balance,
        });
    }

    let mut distributed: Amount = 0;
    let mut recipients: u64 = 0;
    for (address, weight) in &eligible {
        let share = mul_div(pool.balance, *weight, total_weight)?;
        if share == 0 {
            continue;
        }
        let outcome = txn.credit_user(address, share, RewardKind::Pool(kind), None)?;
        if outcome.credited > 0 {
            distributed = checked_add(distributed, outcome.credited, "pool distribution")?;
            recipients += 1;
        }
    }

    let carried_forward = checked_sub(pool.balance, distributed, "pool distribution")?;
    {
        let pool = txn.pool_mut(kind);
        pool.balance = carried_forward;
        pool.total_distributed_lifetime =
            checked_add(pool.total_distributed_lifetime, distributed, "pool lifetime")?;
    }
    advance(txn, kind, env.ctx.now);

    txn.emit(LedgerEvent::PoolDistributed {
        pool: kind,
        distributed,
        recipients,
        carried_forward,
        at: env.ctx.now,
    });
    info!(
        "{} pool distributed {} to {} recipients, {} carried forward",
        kind, distributed, recipients, carried_forward
    );

    Ok(DistributionOutcome::Distributed {
        distributed,
        recipients,
        carried_forward,
    })
}

fn advance(txn: &mut LedgerTxn<'_>, kind: PoolKind, now: Timestamp) {
    let pool = txn.pool_mut(kind);
    pool.last_distribution_at = now;
    pool.distribution_count += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_schedule() {
        let mut pool = Pool::new(PoolKind::Community, 100, 1_000);
        assert!(!pool.is_due(1_099));
        assert!(pool.is_due(1_100));
        pool.last_distribution_at = 1_100;
        assert_eq!(pool.next_due_at(), 1_200);
    }

    #[test]
    fn test_pool_kind_parse() {
        assert_eq!("help".parse::<PoolKind>().unwrap(), PoolKind::Community);
        assert_eq!("Leadership".parse::<PoolKind>().unwrap(), PoolKind::Leadership);
        assert!("vip".parse::<PoolKind>().is_err());
        assert_eq!(PoolKind::from_u8(3), Some(PoolKind::Club));
        assert_eq!(PoolKind::from_u8(0), None);
    }

    #[test]
    fn test_eligibility_weights() {
        let config = LedgerConfig::default();
        let mut user = UserAccount::new_member(Address::new([1; 20]), Address::new([2; 20]), 3, 0);
        user.record_investment(100, 4).unwrap();

        assert_eq!(eligibility_weight(PoolKind::Community, &user, &config), 100);
        assert_eq!(eligibility_weight(PoolKind::Club, &user, &config), 1);
        assert_eq!(eligibility_weight(PoolKind::Leadership, &user, &config), 0);

        user.package_level = 2;
        assert_eq!(eligibility_weight(PoolKind::Club, &user, &config), 0);

        user.is_blacklisted = true;
        assert_eq!(eligibility_weight(PoolKind::Community, &user, &config), 0);
    }

    #[test]
    fn test_capped_user_not_eligible() {
        let config = LedgerConfig::default();
        let mut user = UserAccount::new_member(Address::new([1; 20]), Address::new([2; 20]), 4, 0);
        user.record_investment(10, 4).unwrap();
        user.apply_credit(40).unwrap();
        assert_eq!(eligibility_weight(PoolKind::Community, &user, &config), 0);
    }
}
