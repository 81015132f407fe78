//! User ledger records
//!
//! One `UserAccount` per registered address. Accounts are created at
//! registration and never destroyed. Every credit goes through
//! [`UserAccount::apply_credit`], which clamps to the remaining cap headroom
//! so that `total_earned <= earnings_cap` holds after every operation.

use std::fmt;

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};

use crate::catalog::PackageTier;
use crate::errors::{LedgerError, LedgerResult};
use crate::math::checked_add;

/// Leader rank, monotonically non-decreasing
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(u8)]
pub enum Rank {
    #[default]
    Member = 0,
    ShiningStar = 1,
    SilverStar = 2,
}

impl Rank {
    pub fn display_name(&self) -> &'static str {
        match self {
            Rank::Member => "Member",
            Rank::ShiningStar => "Shining Star",
            Rank::SilverStar => "Silver Star",
        }
    }

    /// Rank earned by the given team figures (ignores the current rank)
    pub fn qualify(team_size: u64, direct_referrals: u32, thresholds: &RankThresholds) -> Rank {
        if team_size >= thresholds.silver_star_team
            && direct_referrals >= thresholds.silver_star_directs
        {
            Rank::SilverStar
        } else if team_size >= thresholds.shining_star_team
            && direct_referrals >= thresholds.shining_star_directs
        {
            Rank::ShiningStar
        } else {
            Rank::Member
        }
    }

    /// Share weight in the Leadership pool
    pub fn leadership_weight(&self) -> u128 {
        match self {
            Rank::Member => 0,
            Rank::ShiningStar => 1,
            Rank::SilverStar => 2,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Team figures required for each leader rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankThresholds {
    pub shining_star_team: u64,
    pub shining_star_directs: u32,
    pub silver_star_team: u64,
    pub silver_star_directs: u32,
}

impl Default for RankThresholds {
    fn default() -> Self {
        Self {
            shining_star_team: 250,
            shining_star_directs: 10,
            silver_star_team: 500,
            silver_star_directs: 0,
        }
    }
}

/// Result of offering a credit to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreditOutcome {
    /// Amount added to balance and total_earned
    pub credited: Amount,
    /// Amount refused (cap headroom exhausted or account blacklisted)
    pub forfeited: Amount,
    /// This credit moved the account into the capped-out state
    pub cap_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub address: Address,
    /// `None` only for the root account
    pub sponsor: Option<Address>,
    pub package_level: PackageTier,
    /// Withdrawable credits
    pub balance: Amount,
    pub total_invested: Amount,
    pub total_earned: Amount,
    pub total_withdrawn: Amount,
    pub earnings_cap: Amount,
    pub direct_referral_count: u32,
    pub team_size: u64,
    pub rank: Rank,
    pub is_blacklisted: bool,
    pub auto_compound_enabled: bool,
    pub registered_at: Timestamp,
    pub last_withdrawal_at: Option<Timestamp>,
    /// Day index (`timestamp / 86400`) that `withdrawn_today` refers to
    pub withdrawal_day: u64,
    pub withdrawn_today: Amount,
}

impl UserAccount {
    /// A freshly registered participant
    pub fn new_member(
        address: Address,
        sponsor: Address,
        package_level: PackageTier,
        registered_at: Timestamp,
    ) -> Self {
        Self {
            address,
            sponsor: Some(sponsor),
            package_level,
            balance: 0,
            total_invested: 0,
            total_earned: 0,
            total_withdrawn: 0,
            earnings_cap: 0,
            direct_referral_count: 0,
            team_size: 0,
            rank: Rank::Member,
            is_blacklisted: false,
            auto_compound_enabled: false,
            registered_at,
            last_withdrawal_at: None,
            withdrawal_day: 0,
            withdrawn_today: 0,
        }
    }

    /// The platform root: top tier, no sponsor, uncapped
    pub fn new_root(address: Address, top_tier: PackageTier, registered_at: Timestamp) -> Self {
        Self {
            sponsor: None,
            earnings_cap: Amount::MAX,
            ..Self::new_member(address, Address::zero(), top_tier, registered_at)
        }
    }

    pub fn is_root(&self) -> bool {
        self.sponsor.is_none()
    }

    /// Remaining credit this account may still receive
    pub fn cap_headroom(&self) -> Amount {
        self.earnings_cap.saturating_sub(self.total_earned)
    }

    pub fn is_capped_out(&self) -> bool {
        self.cap_headroom() == 0
    }

    /// Credit up to the remaining cap headroom. Never fails on the cap: the
    /// excess is reported as forfeited. Blacklisted accounts forfeit all.
    pub fn apply_credit(&mut self, amount: Amount) -> LedgerResult<CreditOutcome> {
        if amount == 0 {
            return Ok(CreditOutcome::default());
        }
        if self.is_blacklisted {
            return Ok(CreditOutcome {
                credited: 0,
                forfeited: amount,
                cap_reached: false,
            });
        }

        let was_capped = self.is_capped_out();
        let credited = amount.min(self.cap_headroom());
        self.balance = checked_add(self.balance, credited, "user balance")?;
        self.total_earned = checked_add(self.total_earned, credited, "user total_earned")?;

        Ok(CreditOutcome {
            credited,
            forfeited: amount - credited,
            cap_reached: !was_capped && self.is_capped_out(),
        })
    }

    /// Record a package purchase and raise the cap by `multiplier × amount`
    pub fn record_investment(&mut self, amount: Amount, multiplier: u32) -> LedgerResult<()> {
        self.total_invested = checked_add(self.total_invested, amount, "user total_invested")?;
        if self.is_root() {
            return Ok(());
        }
        let raise = amount
            .checked_mul(Amount::from(multiplier))
            .ok_or(LedgerError::Overflow("earnings cap"))?;
        self.earnings_cap = checked_add(self.earnings_cap, raise, "earnings cap")?;
        Ok(())
    }

    /// Re-evaluate rank; returns `(old, new)` when it rose
    pub fn refresh_rank(&mut self, thresholds: &RankThresholds) -> Option<(Rank, Rank)> {
        let qualified = Rank::qualify(self.team_size, self.direct_referral_count, thresholds);
        if qualified > self.rank {
            let old = self.rank;
            self.rank = qualified;
            Some((old, qualified))
        } else {
            None
        }
    }

    /// Amount withdrawn so far on the UTC day containing `now`
    pub fn withdrawn_on_day_of(&self, now: Timestamp) -> Amount {
        if self.withdrawal_day == day_index(now) {
            self.withdrawn_today
        } else {
            0
        }
    }
}

pub fn day_index(timestamp: Timestamp) -> u64 {
    timestamp / 86_400
}
