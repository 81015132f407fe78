//! Ledger events
//!
//! Emitted into the operation receipt in the order they happened. Events
//! describe committed changes only; a failed operation returns no events.

use std::fmt;

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};

use crate::catalog::PackageTier;
use crate::config::DistributionPolicy;
use crate::gateway::Asset;
use crate::pools::PoolKind;
use crate::referral::MatrixSide;
use crate::user::Rank;

/// Why a credit landed where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    Direct,
    /// `depth` is 1 for the direct sponsor
    Level { depth: u8 },
    Upline,
    Pool(PoolKind),
    CompoundBonus,
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardKind::Direct => write!(f, "direct"),
            RewardKind::Level { depth } => write!(f, "level-{}", depth),
            RewardKind::Upline => write!(f, "upline"),
            RewardKind::Pool(kind) => write!(f, "{}-pool", kind),
            RewardKind::CompoundBonus => write!(f, "compound-bonus"),
        }
    }
}

/// Why value went to the Community pool instead of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForfeitReason {
    CapReached,
    Blacklisted,
    MissingAncestor,
    RoundingDust,
}

/// Where a withdrawal's reinvested portion went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReinvestTarget {
    CommunityPool,
    AutoCompound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    UserRegistered {
        user: Address,
        sponsor: Address,
        tier: PackageTier,
        amount: Amount,
    },
    PackageUpgraded {
        user: Address,
        from_tier: PackageTier,
        to_tier: PackageTier,
        amount: Amount,
    },
    RewardCredited {
        recipient: Address,
        /// Participant whose payment produced the reward, if any
        source: Option<Address>,
        kind: RewardKind,
        amount: Amount,
    },
    EarningsCapReached {
        user: Address,
        cap: Amount,
    },
    Forfeited {
        /// Intended recipient, `None` for unallocated shares
        intended: Option<Address>,
        amount: Amount,
        reason: ForfeitReason,
    },
    PoolCredited {
        pool: PoolKind,
        amount: Amount,
    },
    Withdrawal {
        user: Address,
        amount: Amount,
        withdrawn: Amount,
        /// Stable-token value the user received
        received: Amount,
        /// Asset the payout was made in
        asset: Asset,
        /// Units of `asset` sent to the user
        paid: Amount,
    },
    AdminFeeCollected {
        user: Address,
        treasury: Address,
        amount: Amount,
    },
    ReinvestmentProcessed {
        user: Address,
        amount: Amount,
        target: ReinvestTarget,
    },
    PoolDistributed {
        pool: PoolKind,
        distributed: Amount,
        recipients: u64,
        carried_forward: Amount,
        at: Timestamp,
    },
    RankChanged {
        user: Address,
        from: Rank,
        to: Rank,
    },
    AutoCompoundChanged {
        user: Address,
        enabled: bool,
    },
    MatrixPlaced {
        user: Address,
        parent: Address,
        side: MatrixSide,
    },

    // Admin
    Paused { by: Address },
    Unpaused { by: Address },
    TreasuryUpdated { old: Address, new: Address },
    CircuitBreakerUpdated { threshold: Amount, window_secs: u64 },
    DailyLimitUpdated { limit: Option<Amount> },
    DistributionPolicyUpdated { policy: DistributionPolicy },
    Blacklisted { user: Address },
    Unblacklisted { user: Address },
    AdminAdded { admin: Address },
    AdminRemoved { admin: Address },
    OracleAdded { oracle: Address },
    OracleRemoved { oracle: Address },
    MinOraclesUpdated { min_oracles: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_kind_display() {
        assert_eq!(RewardKind::Level { depth: 4 }.to_string(), "level-4");
        assert_eq!(RewardKind::Pool(PoolKind::Club).to_string(), "club-pool");
        assert_eq!(RewardKind::CompoundBonus.to_string(), "compound-bonus");
    }

    #[test]
    fn test_event_json_keeps_variant_and_fields() {
        let event = LedgerEvent::Forfeited {
            intended: None,
            amount: 42,
            reason: ForfeitReason::RoundingDust,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Forfeited"]["reason"], "RoundingDust");
        assert_eq!(json["Forfeited"]["amount"], 42);
        assert!(json["Forfeited"]["intended"].is_null());

        let decoded: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, event);
    }
}
