//! Key Encoding Helpers
//!
//! Key encoding is part of the on-disk format. Never inline key construction
//! in business logic.
//!
//! # Format Conventions
//!
//! - Addresses are raw bytes (20 bytes)
//! - Referral edges are `sponsor ‖ referred` so that one sponsor's referrals
//!   form a contiguous prefix range
//! - Pools are keyed by their kind discriminant (1 byte)
//! - Breaker outflows are `timestamp (BE) ‖ user`, so iteration order is
//!   time order

use lib_types::{Address, Timestamp, ADDRESS_LEN};

use crate::pools::PoolKind;

/// Key for users tree: address (20 bytes) → user_bytes
#[inline]
pub fn user_key(address: &Address) -> &[u8; ADDRESS_LEN] {
    address.as_bytes()
}

/// Key for referrals tree: sponsor (20) + referred (20) → edge_bytes
#[inline]
pub fn referral_key(sponsor: &Address, referred: &Address) -> [u8; 2 * ADDRESS_LEN] {
    let mut key = [0u8; 2 * ADDRESS_LEN];
    key[..ADDRESS_LEN].copy_from_slice(sponsor.as_bytes());
    key[ADDRESS_LEN..].copy_from_slice(referred.as_bytes());
    key
}

/// Prefix of every referral key under `sponsor`
#[inline]
pub fn referral_prefix(sponsor: &Address) -> &[u8; ADDRESS_LEN] {
    sponsor.as_bytes()
}

/// Split a referral key back into `(sponsor, referred)`
#[inline]
pub fn parse_referral_key(key: &[u8]) -> Option<(Address, Address)> {
    if key.len() != 2 * ADDRESS_LEN {
        return None;
    }
    let sponsor = Address::from_slice(&key[..ADDRESS_LEN])?;
    let referred = Address::from_slice(&key[ADDRESS_LEN..])?;
    Some((sponsor, referred))
}

/// Key for pools tree: kind (1 byte) → pool_bytes
#[inline]
pub fn pool_key(kind: PoolKind) -> [u8; 1] {
    [kind as u8]
}

/// Key for matrix tree: seated user (20 bytes) → placement_bytes
#[inline]
pub fn matrix_key(user: &Address) -> &[u8; ADDRESS_LEN] {
    user.as_bytes()
}

/// Key for outflows tree: timestamp (8, BE) + user (20) → outflow_bytes
#[inline]
pub fn outflow_key(at: Timestamp, user: &Address) -> [u8; 8 + ADDRESS_LEN] {
    let mut key = [0u8; 8 + ADDRESS_LEN];
    key[..8].copy_from_slice(&at.to_be_bytes());
    key[8..].copy_from_slice(user.as_bytes());
    key
}

/// Meta keys
pub mod meta {
    pub const SYSTEM: &[u8] = b"system";
    pub const SCHEMA_VERSION: &[u8] = b"schema_version";
}
