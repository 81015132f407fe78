//! Referral graph
//!
//! Sponsor edges are created once at registration and never change. The
//! bonus walks use a fixed-capacity [`AncestorSet`] so the cost of a walk is
//! bounded by [`MAX_CHAIN_DEPTH`] no matter how deep the tree grows. Team
//! sizes are maintained incrementally at registration time instead of being
//! recomputed by traversal.
//!
//! Beside the sponsor tree every member also gets one seat in a binary
//! placement matrix. A newcomer takes the first free slot (left, then right)
//! under its sponsor; when both are taken the search moves down the left
//! child and tries again. Placements never move once assigned.

use lib_types::{Address, Timestamp};
use serde::{Deserialize, Serialize};

/// Deepest ancestor walk any bonus may request
pub const MAX_CHAIN_DEPTH: usize = 30;

/// Directed edge `sponsor → referred`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub sponsor: Address,
    pub referred: Address,
    pub created_at: Timestamp,
}

/// Slot of a matrix seat under its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatrixSide {
    Left,
    Right,
}

impl MatrixSide {
    pub fn index(self) -> usize {
        match self {
            MatrixSide::Left => 0,
            MatrixSide::Right => 1,
        }
    }
}

impl std::fmt::Display for MatrixSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MatrixSide::Left => "left",
            MatrixSide::Right => "right",
        })
    }
}

/// Seat of `user` in the placement matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixPlacement {
    pub user: Address,
    pub parent: Address,
    pub side: MatrixSide,
    pub placed_at: Timestamp,
}

/// Read access to matrix seats
pub trait MatrixLookup {
    /// `[left, right]` children of `parent`
    fn matrix_children(&self, parent: &Address) -> [Option<Address>; 2];

    /// Upper bound on the number of seats, used to bound the search
    fn matrix_bound(&self) -> u64;
}

/// Find the seat a newcomer sponsored by `sponsor` takes. Returns `None`
/// only when the search exceeds `matrix_bound()`, which a consistent
/// matrix never does.
pub fn find_matrix_slot<L: MatrixLookup + ?Sized>(lookup: &L, sponsor: &Address) -> Option<(Address, MatrixSide)> {
    let mut parent = *sponsor;
    for _ in 0..=lookup.matrix_bound() {
        let [left, right] = lookup.matrix_children(&parent);
        match (left, right) {
            (None, _) => return Some((parent, MatrixSide::Left)),
            (Some(_), None) => return Some((parent, MatrixSide::Right)),
            (Some(left), Some(_)) => parent = left,
        }
    }
    None
}

/// Read access to sponsor links
pub trait SponsorLookup {
    /// Sponsor of `user`, or `None` for the root and unknown addresses
    fn sponsor_of(&self, user: &Address) -> Option<Address>;

    /// Upper bound on chain length (number of registered accounts)
    fn chain_bound(&self) -> u64;
}

/// Up to `MAX_CHAIN_DEPTH` ancestors, nearest first
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AncestorSet {
    slots: [Address; MAX_CHAIN_DEPTH],
    len: usize,
}

impl AncestorSet {
    pub const fn new() -> Self {
        Self {
            slots: [Address::zero(); MAX_CHAIN_DEPTH],
            len: 0,
        }
    }

    /// Append an ancestor; returns false when full
    pub fn push(&mut self, address: Address) -> bool {
        if self.len == MAX_CHAIN_DEPTH {
            return false;
        }
        self.slots[self.len] = address;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ancestor at `depth` (0 = direct sponsor)
    pub fn get(&self, depth: usize) -> Option<Address> {
        self.as_slice().get(depth).copied()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.slots[..self.len]
    }

    /// The nearest `depth` ancestors (or all of them when fewer exist)
    pub fn nearest(&self, depth: usize) -> &[Address] {
        &self.slots[..self.len.min(depth)]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.as_slice().iter()
    }
}

impl Default for AncestorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AncestorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Sponsor chain above `user`, nearest first, stopping at the root or after
/// `max_depth` hops (never more than `MAX_CHAIN_DEPTH`).
pub fn ancestors_of<L: SponsorLookup + ?Sized>(lookup: &L, user: &Address, max_depth: usize) -> AncestorSet {
    let depth = max_depth.min(MAX_CHAIN_DEPTH);
    let mut ancestors = AncestorSet::new();
    let mut cursor = *user;
    while ancestors.len() < depth {
        match lookup.sponsor_of(&cursor) {
            Some(sponsor) => {
                ancestors.push(sponsor);
                cursor = sponsor;
            }
            None => break,
        }
    }
    ancestors
}

/// Every ancestor on the full chain above `user`, nearest first. The walk is
/// bounded by `chain_bound()` so a corrupted store cannot loop forever.
pub fn full_chain<L: SponsorLookup + ?Sized>(lookup: &L, user: &Address) -> Vec<Address> {
    let bound = lookup.chain_bound();
    let mut chain = Vec::new();
    let mut cursor = *user;
    while (chain.len() as u64) < bound {
        match lookup.sponsor_of(&cursor) {
            Some(sponsor) => {
                chain.push(sponsor);
                cursor = sponsor;
            }
            None => break,
        }
    }
    chain
}
