//! Package catalog
//!
//! Fixed table of package tiers. Tier numbers are contiguous from 1, prices
//! strictly increase with the tier, and the six allocation fields of every
//! tier sum to exactly 10000 bps so that no part of a payment is unassigned.

use lib_types::{Amount, Bps};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{LedgerError, LedgerResult};
use crate::math::pow10;

/// Package tier number, 1-based
pub type PackageTier = u8;

// Standard plan allocation (identical for every tier)
pub const STANDARD_DIRECT_BONUS_BPS: Bps = 4000;
pub const STANDARD_LEVEL_BONUS_BPS: Bps = 1000;
pub const STANDARD_UPLINE_BONUS_BPS: Bps = 1000;
pub const STANDARD_LEADER_POOL_BPS: Bps = 1000;
pub const STANDARD_HELP_POOL_BPS: Bps = 3000;
pub const STANDARD_CLUB_POOL_BPS: Bps = 0;

/// Standard tier prices in whole tokens
pub const STANDARD_PRICES: [u64; 4] = [30, 50, 100, 200];

const _: () = assert!(
    STANDARD_DIRECT_BONUS_BPS as u32
        + STANDARD_LEVEL_BONUS_BPS as u32
        + STANDARD_UPLINE_BONUS_BPS as u32
        + STANDARD_LEADER_POOL_BPS as u32
        + STANDARD_HELP_POOL_BPS as u32
        + STANDARD_CLUB_POOL_BPS as u32
        == 10_000,
    "standard plan must allocate exactly 100%"
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Package table is empty")]
    Empty,

    #[error("Package tiers must be contiguous from 1: expected {expected}, got {actual}")]
    NonContiguousTier { expected: PackageTier, actual: PackageTier },

    #[error("Tier {tier} allocates {total} bps, expected 10000")]
    BpsSum { tier: PackageTier, total: u32 },

    #[error("Tier {tier} has a zero price")]
    ZeroPrice { tier: PackageTier },

    #[error("Tier {tier} price does not exceed the tier below it")]
    PriceNotIncreasing { tier: PackageTier },

    #[error("Too many tiers: {0}")]
    TooManyTiers(usize),

    #[error("Price of tier {tier} overflows the token unit")]
    PriceOverflow { tier: PackageTier },
}

/// One purchasable package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub tier: PackageTier,
    /// Price in token base units
    pub price: Amount,
    pub direct_bonus_bps: Bps,
    pub level_bonus_bps: Bps,
    pub upline_bonus_bps: Bps,
    pub leader_pool_bps: Bps,
    pub help_pool_bps: Bps,
    pub club_pool_bps: Bps,
}

impl Package {
    pub fn total_bps(&self) -> u32 {
        [
            self.direct_bonus_bps,
            self.level_bonus_bps,
            self.upline_bonus_bps,
            self.leader_pool_bps,
            self.help_pool_bps,
            self.club_pool_bps,
        ]
        .iter()
        .map(|bps| u32::from(*bps))
        .sum()
    }
}

/// Configuration form of a package: price in whole tokens, tier implied by
/// position in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub price_tokens: u64,
    pub direct_bonus_bps: Bps,
    pub level_bonus_bps: Bps,
    pub upline_bonus_bps: Bps,
    pub leader_pool_bps: Bps,
    pub help_pool_bps: Bps,
    pub club_pool_bps: Bps,
}

impl PackageSpec {
    pub fn standard(price_tokens: u64) -> Self {
        Self {
            price_tokens,
            direct_bonus_bps: STANDARD_DIRECT_BONUS_BPS,
            level_bonus_bps: STANDARD_LEVEL_BONUS_BPS,
            upline_bonus_bps: STANDARD_UPLINE_BONUS_BPS,
            leader_pool_bps: STANDARD_LEADER_POOL_BPS,
            help_pool_bps: STANDARD_HELP_POOL_BPS,
            club_pool_bps: STANDARD_CLUB_POOL_BPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCatalog {
    packages: Vec<Package>,
}

impl PackageCatalog {
    /// Validate and build a catalog
    pub fn new(packages: Vec<Package>) -> Result<Self, CatalogError> {
        if packages.is_empty() {
            return Err(CatalogError::Empty);
        }
        if packages.len() > usize::from(PackageTier::MAX) {
            return Err(CatalogError::TooManyTiers(packages.len()));
        }

        let mut previous_price: Option<Amount> = None;
        for (index, package) in packages.iter().enumerate() {
            let expected = (index + 1) as PackageTier;
            if package.tier != expected {
                return Err(CatalogError::NonContiguousTier {
                    expected,
                    actual: package.tier,
                });
            }
            let total = package.total_bps();
            if total != 10_000 {
                return Err(CatalogError::BpsSum {
                    tier: package.tier,
                    total,
                });
            }
            if package.price == 0 {
                return Err(CatalogError::ZeroPrice { tier: package.tier });
            }
            if previous_price.is_some_and(|prev| package.price <= prev) {
                return Err(CatalogError::PriceNotIncreasing { tier: package.tier });
            }
            previous_price = Some(package.price);
        }

        Ok(Self { packages })
    }

    /// Build from whole-token specs for a token with `decimals` decimals
    pub fn from_specs(specs: &[PackageSpec], decimals: u8) -> Result<Self, CatalogError> {
        let unit = pow10(u32::from(decimals)).map_err(|_| CatalogError::PriceOverflow { tier: 1 })?;
        let mut packages = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let tier = PackageTier::try_from(index + 1)
                .map_err(|_| CatalogError::TooManyTiers(specs.len()))?;
            let price = Amount::from(spec.price_tokens)
                .checked_mul(unit)
                .ok_or(CatalogError::PriceOverflow { tier })?;
            packages.push(Package {
                tier,
                price,
                direct_bonus_bps: spec.direct_bonus_bps,
                level_bonus_bps: spec.level_bonus_bps,
                upline_bonus_bps: spec.upline_bonus_bps,
                leader_pool_bps: spec.leader_pool_bps,
                help_pool_bps: spec.help_pool_bps,
                club_pool_bps: spec.club_pool_bps,
            });
        }
        Self::new(packages)
    }

    /// The four-tier plan: 30 / 50 / 100 / 200 tokens
    pub fn standard(decimals: u8) -> Result<Self, CatalogError> {
        let specs: Vec<PackageSpec> = STANDARD_PRICES.iter().map(|p| PackageSpec::standard(*p)).collect();
        Self::from_specs(&specs, decimals)
    }

    pub fn get(&self, tier: PackageTier) -> Option<&Package> {
        if tier == 0 {
            return None;
        }
        self.packages.get(usize::from(tier) - 1)
    }

    pub fn require(&self, tier: PackageTier) -> LedgerResult<&Package> {
        self.get(tier).ok_or(LedgerError::InvalidPackageTier(tier))
    }

    pub fn top_tier(&self) -> PackageTier {
        self.packages.len() as PackageTier
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }
}
