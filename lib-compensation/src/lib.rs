//! LeadFive Compensation Ledger
//!
//! Accounting core of a referral-based compensation plan. Users buy one of a
//! fixed set of packages under a sponsor; every payment is split into
//! direct, level and upline bonuses plus three shared pools, each credit
//! clamped to the recipient's lifetime earnings cap. Balances leave through
//! withdrawals that split into a payout and a reinvestment.
//!
//! CONSERVATION
//!
//! Every unit of every payment lands somewhere: a user balance, a pool, or
//! the Community pool as a forfeiture. Nothing is silently dropped.
//!
//! ATOMICITY
//!
//! Each public operation on [`Ledger`] either commits entirely (memory,
//! store and token gateway) or leaves all three untouched.

pub mod admin;
pub mod catalog;
pub mod commission;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod math;
pub mod oracle;
pub mod pools;
pub mod referral;
pub mod state;
pub mod storage;
pub mod user;
pub mod withdrawal;

pub use catalog::{Package, PackageCatalog, PackageSpec, PackageTier};
pub use commission::{CommissionBreakdown, Payment, PaymentMethod, PoolCredits, Registration, Upgrade};
pub use config::{
    CircuitBreakerConfig, ConfigError, DistributionPolicy, LedgerConfig, PoolSchedule, UpgradePricing,
};
pub use engine::{CallContext, GenesisParams, Ledger, Receipt, SharedLedger, SystemHealth};
pub use errors::{ErrorClass, LedgerError, LedgerResult, SponsorRejection};
pub use events::{ForfeitReason, LedgerEvent, ReinvestTarget, RewardKind};
pub use gateway::{Asset, MemoryTokenGateway, TokenGateway, TransferError};
pub use oracle::{
    stable_to_native, stable_to_native_floor, FixedPriceOracle, OracleConfig, OracleError, OracleSet, PriceOracle,
    PriceQuote,
};
pub use pools::{DistributionOutcome, Pool, PoolKind, PoolSet};
pub use referral::{MatrixLookup, MatrixPlacement, MatrixSide, ReferralEdge, MAX_CHAIN_DEPTH};
pub use state::{Outflow, StateParts, SystemState};
pub use storage::{LedgerStore, SledStore, StorageError, StorageResult};
pub use user::{Rank, RankThresholds, UserAccount};
pub use withdrawal::{PayoutAsset, WithdrawalReceipt, WithdrawalSplit, WithdrawalTier};

pub use lib_types::{Address, Amount, Bps, Timestamp};
