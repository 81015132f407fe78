//! Ledger configuration
//!
//! Deployment parameters of the compensation plan. Defaults match the
//! production plan; any field may be overridden from TOML:
//!
//! ```toml
//! token_decimals = 6
//! upgrade_pricing = "full_price"
//! distribution_policy = "admin_only"
//!
//! [circuit_breaker]
//! threshold_tokens = 50000
//! window_secs = 3600
//!
//! [pools.community]
//! interval_secs = 86400
//! ```

use std::path::Path;

use lib_types::{Amount, Bps};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, PackageCatalog, PackageSpec, PackageTier};
use crate::oracle::OracleConfig;
use crate::pools::PoolKind;
use crate::referral::MAX_CHAIN_DEPTH;
use crate::user::RankThresholds;
use crate::withdrawal::WithdrawalTier;

/// Largest token precision the ledger accepts
pub const MAX_TOKEN_DECIMALS: u8 = 24;

const DAY_SECS: u64 = 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] toml::de::Error),

    #[error("Invalid package table: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// How an upgrade is priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePricing {
    /// Pay `price(new) − price(current)`; bonuses computed on the delta
    #[default]
    Incremental,
    /// Pay the whole new price; bonuses computed on the full price
    FullPrice,
}

/// Who may trigger a pool distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPolicy {
    /// Any caller once the interval has elapsed
    #[default]
    Permissionless,
    /// Owner and admins only
    AdminOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Maximum outflow per window in whole tokens; 0 disables the breaker
    pub threshold_tokens: u64,
    pub window_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold_tokens: 1_000_000,
            window_secs: DAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolScheduleEntry {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSchedule {
    pub leadership: PoolScheduleEntry,
    pub community: PoolScheduleEntry,
    pub club: PoolScheduleEntry,
}

impl Default for PoolSchedule {
    fn default() -> Self {
        Self {
            leadership: PoolScheduleEntry { interval_secs: 15 * DAY_SECS },
            community: PoolScheduleEntry { interval_secs: 7 * DAY_SECS },
            club: PoolScheduleEntry { interval_secs: 15 * DAY_SECS },
        }
    }
}

impl PoolSchedule {
    pub fn interval(&self, kind: PoolKind) -> u64 {
        match kind {
            PoolKind::Leadership => self.leadership.interval_secs,
            PoolKind::Community => self.community.interval_secs,
            PoolKind::Club => self.club.interval_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub token_decimals: u8,
    pub earnings_cap_multiplier: u32,
    pub admin_fee_bps: Bps,
    pub auto_compound_bonus_pct: u32,
    pub withdrawal_tiers: Vec<WithdrawalTier>,
    pub level_bonus_depth: usize,
    pub upline_bonus_depth: usize,
    pub upgrade_pricing: UpgradePricing,
    pub distribution_policy: DistributionPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Per-user daily withdrawal limit in whole tokens
    pub daily_withdrawal_limit_tokens: Option<u64>,
    pub pools: PoolSchedule,
    pub club_min_tier: PackageTier,
    pub ranks: RankThresholds,
    pub oracle: OracleConfig,
    /// Replaces the standard package table when present
    pub packages: Option<Vec<PackageSpec>>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            token_decimals: 18,
            earnings_cap_multiplier: 4,
            admin_fee_bps: 500,
            auto_compound_bonus_pct: 5,
            withdrawal_tiers: WithdrawalTier::standard(),
            level_bonus_depth: 10,
            upline_bonus_depth: MAX_CHAIN_DEPTH,
            upgrade_pricing: UpgradePricing::Incremental,
            distribution_policy: DistributionPolicy::Permissionless,
            circuit_breaker: CircuitBreakerConfig::default(),
            daily_withdrawal_limit_tokens: None,
            pools: PoolSchedule::default(),
            club_min_tier: 3,
            ranks: RankThresholds::default(),
            oracle: OracleConfig::default(),
            packages: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// One whole token in base units
    pub fn token_unit(&self) -> Amount {
        // Bounded by validate(); 10^24 fits comfortably
        10u128.pow(u32::from(self.token_decimals.min(MAX_TOKEN_DECIMALS)))
    }

    pub fn circuit_breaker_threshold(&self) -> Amount {
        Amount::from(self.circuit_breaker.threshold_tokens).saturating_mul(self.token_unit())
    }

    pub fn daily_withdrawal_limit(&self) -> Option<Amount> {
        self.daily_withdrawal_limit_tokens
            .map(|tokens| Amount::from(tokens).saturating_mul(self.token_unit()))
    }

    pub fn catalog(&self) -> Result<PackageCatalog, ConfigError> {
        let catalog = match &self.packages {
            Some(specs) => PackageCatalog::from_specs(specs, self.token_decimals)?,
            None => PackageCatalog::standard(self.token_decimals)?,
        };
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(invalid("token_decimals", format!("must be at most {}", MAX_TOKEN_DECIMALS)));
        }
        if self.oracle.native_decimals > MAX_TOKEN_DECIMALS {
            return Err(invalid("oracle.native_decimals", format!("must be at most {}", MAX_TOKEN_DECIMALS)));
        }
        if self.earnings_cap_multiplier == 0 {
            return Err(invalid("earnings_cap_multiplier", "must be at least 1"));
        }
        if u128::from(self.admin_fee_bps) > lib_types::BPS_DENOMINATOR {
            return Err(invalid("admin_fee_bps", "must not exceed 10000"));
        }
        WithdrawalTier::validate_table(&self.withdrawal_tiers)
            .map_err(|reason| invalid("withdrawal_tiers", reason))?;
        if self.level_bonus_depth == 0 || self.level_bonus_depth > MAX_CHAIN_DEPTH {
            return Err(invalid("level_bonus_depth", format!("must be within 1..={}", MAX_CHAIN_DEPTH)));
        }
        if self.upline_bonus_depth == 0 || self.upline_bonus_depth > MAX_CHAIN_DEPTH {
            return Err(invalid("upline_bonus_depth", format!("must be within 1..={}", MAX_CHAIN_DEPTH)));
        }
        if self.circuit_breaker.threshold_tokens > 0 && self.circuit_breaker.window_secs == 0 {
            return Err(invalid("circuit_breaker.window_secs", "must be positive when the breaker is enabled"));
        }
        for kind in PoolKind::ALL {
            if self.pools.interval(*kind) == 0 {
                return Err(invalid("pools", format!("{} interval must be positive", kind)));
            }
        }
        if self.oracle.min_price == 0 || self.oracle.min_price > self.oracle.max_price {
            return Err(invalid("oracle", "require 0 < min_price <= max_price"));
        }
        if self.oracle.min_oracles == 0 {
            return Err(invalid("oracle.min_oracles", "must be at least 1"));
        }

        let catalog = self.catalog()?;
        if self.club_min_tier == 0 || self.club_min_tier > catalog.top_tier() {
            return Err(invalid("club_min_tier", format!("must be within 1..={}", catalog.top_tier())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.token_unit(), 1_000_000_000_000_000_000);
        assert_eq!(config.circuit_breaker_threshold(), 1_000_000 * config.token_unit());
        assert_eq!(config.daily_withdrawal_limit(), None);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = LedgerConfig::from_toml_str(
            r#"
            token_decimals = 6
            upgrade_pricing = "full_price"
            distribution_policy = "admin_only"
            daily_withdrawal_limit_tokens = 1000

            [circuit_breaker]
            threshold_tokens = 0

            [pools.community]
            interval_secs = 86400
            "#,
        )
        .unwrap();
        assert_eq!(config.token_decimals, 6);
        assert_eq!(config.upgrade_pricing, UpgradePricing::FullPrice);
        assert_eq!(config.distribution_policy, DistributionPolicy::AdminOnly);
        assert_eq!(config.daily_withdrawal_limit(), Some(1_000_000_000));
        assert_eq!(config.pools.interval(PoolKind::Community), 86_400);
        // Untouched sections keep defaults
        assert_eq!(config.pools.interval(PoolKind::Leadership), 15 * 86_400);
        assert_eq!(config.admin_fee_bps, 500);
    }

    #[test]
    fn test_package_override() {
        let config = LedgerConfig::from_toml_str(
            r#"
            [[packages]]
            price_tokens = 10
            direct_bonus_bps = 5000
            level_bonus_bps = 1000
            upline_bonus_bps = 1000
            leader_pool_bps = 1000
            help_pool_bps = 1000
            club_pool_bps = 1000
            "#,
        );
        // club_min_tier defaults to 3 but the table has one tier
        assert!(matches!(config, Err(ConfigError::Invalid { field: "club_min_tier", .. })));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = LedgerConfig::default();
        config.level_bonus_depth = 31;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.admin_fee_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.token_decimals = 30;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.oracle.min_price = config.oracle.max_price + 1;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.oracle.min_oracles = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "oracle.min_oracles", .. })));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            LedgerConfig::from_toml_str("token_decimals = \"eighteen\""),
            Err(ConfigError::Parsing(_))
        ));
    }
}
