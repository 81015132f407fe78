//! Ledger Errors
//!
//! Every failure a ledger operation can report. Each variant belongs to one
//! class of the error taxonomy so callers can tell "fix your input" from
//! "try again later" from "contact support" without string matching.
//!
//! Any error returned from a public operation means the operation had no
//! effect: no balances, pools, users or token transfers changed.

use std::fmt;

use lib_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::PackageTier;
use crate::gateway::TransferError;
use crate::oracle::OracleError;
use crate::storage::StorageError;

/// Result alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Why a sponsor was refused at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SponsorRejection {
    NotRegistered,
    Blacklisted,
    SelfReferral,
}

impl fmt::Display for SponsorRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SponsorRejection::NotRegistered => "sponsor is not registered",
            SponsorRejection::Blacklisted => "sponsor is blacklisted",
            SponsorRejection::SelfReferral => "cannot sponsor yourself",
        };
        f.write_str(reason)
    }
}

/// Error taxonomy buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Bad input, rejected before touching state
    Validation,
    /// Request conflicts with current ledger state
    StateConsistency,
    /// A collaborator (token, oracle, storage) failed; retry later
    ExternalDependency,
    /// Refused by operator policy
    Policy,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // =========================================================================
    // Validation
    // =========================================================================
    #[error("Invalid package tier: {0}")]
    InvalidPackageTier(PackageTier),

    #[error("Invalid sponsor {sponsor}: {reason}")]
    InvalidSponsor {
        sponsor: Address,
        reason: SponsorRejection,
    },

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Package tier {requested} is not above current tier {current}")]
    TierNotHigher {
        current: PackageTier,
        requested: PackageTier,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // State consistency
    // =========================================================================
    #[error("Address {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("Address {0} is not registered")]
    NotRegistered(Address),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Conservation violated: distributed {distributed} of {amount}")]
    ConservationViolated { distributed: Amount, amount: Amount },

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("No free matrix seat found below {0}")]
    MatrixCorrupted(Address),

    // =========================================================================
    // External dependency
    // =========================================================================
    #[error("Payment failed: {0}")]
    PaymentFailed(TransferError),

    #[error("Payout failed: {0}")]
    PayoutFailed(TransferError),

    #[error("Token gateway unavailable: {0}")]
    Gateway(TransferError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] OracleError),

    #[error("Native payments are not configured")]
    NativePaymentUnavailable,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // =========================================================================
    // Policy
    // =========================================================================
    #[error("Address {0} is blacklisted")]
    UserBlacklisted(Address),

    #[error("Ledger is paused")]
    ContractPaused,

    #[error("Circuit breaker tripped: window outflow {window_total} would exceed {threshold}")]
    CircuitBreakerTripped { window_total: Amount, threshold: Amount },

    #[error("Daily withdrawal limit exceeded: used {used}, requested {requested}, limit {limit}")]
    DailyLimitExceeded {
        used: Amount,
        requested: Amount,
        limit: Amount,
    },

    #[error("Caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("Root account {0} cannot be {1}")]
    RootProtected(Address, &'static str),
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        use LedgerError::*;
        match self {
            InvalidPackageTier(_)
            | InvalidSponsor { .. }
            | ZeroAmount
            | TierNotHigher { .. }
            | InvalidAddress(_)
            | InvalidParameter(_)
            | InvalidConfig(_) => ErrorClass::Validation,

            AlreadyRegistered(_)
            | NotRegistered(_)
            | InsufficientBalance { .. }
            | Overflow(_)
            | ConservationViolated { .. }
            | LockPoisoned
            | MatrixCorrupted(_) => ErrorClass::StateConsistency,

            PaymentFailed(_)
            | PayoutFailed(_)
            | Gateway(_)
            | PriceFeed(_)
            | NativePaymentUnavailable
            | Storage(_) => ErrorClass::ExternalDependency,

            UserBlacklisted(_)
            | ContractPaused
            | CircuitBreakerTripped { .. }
            | DailyLimitExceeded { .. }
            | Unauthorized(_)
            | RootProtected(..) => ErrorClass::Policy,
        }
    }

    /// True when the same call may succeed later without any input change
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::NativePaymentUnavailable => false,
            LedgerError::CircuitBreakerTripped { .. }
            | LedgerError::DailyLimitExceeded { .. } => true,
            other => other.class() == ErrorClass::ExternalDependency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(LedgerError::ZeroAmount.class(), ErrorClass::Validation);
        assert_eq!(
            LedgerError::AlreadyRegistered(Address::new([1; 20])).class(),
            ErrorClass::StateConsistency
        );
        assert_eq!(LedgerError::ContractPaused.class(), ErrorClass::Policy);
        let stale = LedgerError::from(OracleError::StalePrice { age: 3600, max_age: 1800 });
        assert_eq!(stale.class(), ErrorClass::ExternalDependency);
    }

    #[test]
    fn test_retryable_distinguishes_feed_from_blacklist() {
        let stale = LedgerError::from(OracleError::StalePrice { age: 3600, max_age: 1800 });
        assert!(stale.is_retryable());
        assert!(!LedgerError::UserBlacklisted(Address::new([2; 20])).is_retryable());
        assert!(!LedgerError::InsufficientBalance { available: 1, requested: 2 }.is_retryable());
        assert!(!LedgerError::NativePaymentUnavailable.is_retryable());
    }

    #[test]
    fn test_sponsor_rejection_message() {
        let err = LedgerError::InvalidSponsor {
            sponsor: Address::new([0xaa; 20]),
            reason: SponsorRejection::SelfReferral,
        };
        assert!(err.to_string().contains("cannot sponsor yourself"));
    }
}
