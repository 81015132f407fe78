//! Canonical Primitive Types for the Compensation Ledger
//!
//! These types are the foundational building blocks for every ledger record.
//! They are designed to be:
//! - Fixed-size (no dynamic allocation)
//! - Deterministically serializable
//! - Efficient to copy and compare

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Token amounts in base units (18-decimal tokens fit comfortably in u128)
pub type Amount = u128;

/// Basis points for percentage calculations (10000 = 100%)
pub type Bps = u16;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// 100.00% expressed in basis points
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Length of an account address in bytes
pub const ADDRESS_LEN: usize = 20;

// ============================================================================
// ADDRESS
// ============================================================================

/// 20-byte account address
///
/// Displayed and parsed as `0x`-prefixed lowercase hex. The zero address is
/// reserved and never identifies a participant.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Create a new Address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a zeroed Address
    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_LEN])
    }

    /// Get the underlying bytes
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Rebuild an address from a byte slice of exactly `ADDRESS_LEN` bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Failure to parse an address from text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        Address::from_slice(&bytes).ok_or(AddressParseError::InvalidLength {
            expected: ADDRESS_LEN,
            actual: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_basics() {
        let addr = Address::new([3u8; ADDRESS_LEN]);
        assert!(!addr.is_zero());
        assert!(Address::zero().is_zero());
        assert_eq!(addr.as_bytes(), &[3u8; ADDRESS_LEN]);
    }

    #[test]
    fn test_display_and_parse() {
        let addr = Address::new([0xab; ADDRESS_LEN]);
        let text = addr.to_string();
        assert_eq!(text, format!("0x{}", "ab".repeat(ADDRESS_LEN)));
        assert_eq!(text.parse::<Address>().unwrap(), addr);

        // Prefix is optional, case-insensitive hex
        let upper = "AB".repeat(ADDRESS_LEN);
        assert_eq!(upper.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::InvalidLength { expected: 20, actual: 2 })
        ));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let addr = Address::new([7u8; ADDRESS_LEN]);
        let bytes = bincode::serialize(&addr).unwrap();
        let back: Address = bincode::deserialize(&bytes).unwrap();
        assert_eq!(addr, back);

        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let low = Address::new([1u8; ADDRESS_LEN]);
        let high = Address::new([2u8; ADDRESS_LEN]);
        assert!(low < high);
    }
}
