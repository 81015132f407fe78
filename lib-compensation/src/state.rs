//! Ledger state and the per-operation overlay
//!
//! `LedgerState` is the committed view. Every public operation works on a
//! `LedgerTxn`: a buffer of pending changes layered over the committed
//! state. Reads see the buffer first. On success the buffer is turned into a
//! `ChangeSet` that is persisted and then merged; on failure it is dropped,
//! which restores the exact pre-operation state for free.

use std::collections::{BTreeMap, BTreeSet};

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::PackageCatalog;
use crate::config::{DistributionPolicy, LedgerConfig};
use crate::engine::CallContext;
use crate::errors::{LedgerError, LedgerResult};
use crate::math::checked_add;
use crate::events::{LedgerEvent, RewardKind};
use crate::oracle::{OracleSet, PriceQuote};
use crate::pools::{Pool, PoolKind, PoolSet};
use crate::referral::{MatrixLookup, MatrixPlacement, ReferralEdge, SponsorLookup};
use crate::user::{CreditOutcome, UserAccount};

/// Global ledger settings and counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub owner: Address,
    pub admins: BTreeSet<Address>,
    pub treasury: Address,
    pub root: Address,
    pub paused: bool,
    /// Maximum outflow per window in base units; 0 disables the breaker
    pub circuit_breaker_threshold: Amount,
    pub circuit_breaker_window_secs: u64,
    pub daily_withdrawal_limit: Option<Amount>,
    pub distribution_policy: DistributionPolicy,
    /// Price feeds the admins approved for native pricing
    pub oracles: BTreeSet<Address>,
    pub min_oracles: u32,
    pub total_users: u64,
    pub total_admin_fees: Amount,
    pub genesis_at: Timestamp,
}

impl SystemState {
    pub fn new(
        config: &LedgerConfig,
        owner: Address,
        root: Address,
        treasury: Address,
        genesis_at: Timestamp,
    ) -> Self {
        Self {
            owner,
            admins: BTreeSet::new(),
            treasury,
            root,
            paused: false,
            circuit_breaker_threshold: config.circuit_breaker_threshold(),
            circuit_breaker_window_secs: config.circuit_breaker.window_secs,
            daily_withdrawal_limit: config.daily_withdrawal_limit(),
            distribution_policy: config.distribution_policy,
            oracles: BTreeSet::new(),
            min_oracles: config.oracle.min_oracles,
            total_users: 0,
            total_admin_fees: 0,
            genesis_at,
        }
    }

    /// Owner or listed admin
    pub fn is_admin(&self, address: &Address) -> bool {
        *address == self.owner || self.admins.contains(address)
    }

    /// Entries at or before this instant are outside the breaker window
    pub fn window_start(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(self.circuit_breaker_window_secs)
    }
}

/// Paid-out amount of one user's withdrawals at one instant, kept while it
/// is inside the circuit-breaker window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outflow {
    pub at: Timestamp,
    pub user: Address,
    pub amount: Amount,
}

type OutflowKey = (Timestamp, Address);

fn window_sum<'a>(entries: impl Iterator<Item = (&'a OutflowKey, &'a Amount)>, start: Timestamp) -> Amount {
    entries
        .filter(|((at, _), _)| *at > start)
        .fold(0u128, |acc, (_, amount)| acc.saturating_add(*amount))
}

/// Committed ledger state
#[derive(Debug, Clone)]
pub struct LedgerState {
    users: BTreeMap<Address, UserAccount>,
    /// Keyed `(sponsor, referred)` so a sponsor's referrals are a range
    edges: BTreeMap<(Address, Address), ReferralEdge>,
    placements: BTreeMap<Address, MatrixPlacement>,
    /// `[left, right]` seats under each parent, derived from `placements`
    matrix: BTreeMap<Address, [Option<Address>; 2]>,
    outflows: BTreeMap<OutflowKey, Amount>,
    pools: PoolSet,
    system: SystemState,
}

/// Records a ledger is rebuilt from at open
#[derive(Debug, Clone, Default)]
pub struct StateParts {
    pub users: Vec<UserAccount>,
    pub edges: Vec<ReferralEdge>,
    pub placements: Vec<MatrixPlacement>,
    pub outflows: Vec<Outflow>,
}

impl LedgerState {
    pub fn from_parts(parts: StateParts, pools: PoolSet, system: SystemState) -> Self {
        let mut state = Self {
            users: parts.users.into_iter().map(|u| (u.address, u)).collect(),
            edges: parts
                .edges
                .into_iter()
                .map(|e| ((e.sponsor, e.referred), e))
                .collect(),
            placements: BTreeMap::new(),
            matrix: BTreeMap::new(),
            outflows: parts
                .outflows
                .into_iter()
                .map(|o| ((o.at, o.user), o.amount))
                .collect(),
            pools,
            system,
        };
        for placement in parts.placements {
            state.seat(placement);
        }
        state
    }

    fn seat(&mut self, placement: MatrixPlacement) {
        self.matrix.entry(placement.parent).or_default()[placement.side.index()] = Some(placement.user);
        self.placements.insert(placement.user, placement);
    }

    pub fn user(&self, address: &Address) -> Option<&UserAccount> {
        self.users.get(address)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserAccount> {
        self.users.values()
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    pub fn system(&self) -> &SystemState {
        &self.system
    }

    /// Direct referrals of `sponsor` in address order
    pub fn referrals_of(&self, sponsor: &Address) -> Vec<Address> {
        let low = (*sponsor, Address::zero());
        let high = (*sponsor, Address::new([0xff; lib_types::ADDRESS_LEN]));
        self.edges.range(low..=high).map(|(_, edge)| edge.referred).collect()
    }

    pub fn matrix_placement(&self, user: &Address) -> Option<&MatrixPlacement> {
        self.placements.get(user)
    }

    /// Breaker-window outflow ending at `now`
    pub fn window_outflow(&self, now: Timestamp) -> Amount {
        window_sum(self.outflows.iter(), self.system.window_start(now))
    }

    pub(crate) fn apply(&mut self, changes: ChangeSet) {
        for user in changes.users {
            self.users.insert(user.address, user);
        }
        for edge in changes.edges {
            self.edges.insert((edge.sponsor, edge.referred), edge);
        }
        for placement in changes.placements {
            self.seat(placement);
        }
        for key in changes.expired_outflows {
            self.outflows.remove(&key);
        }
        for outflow in changes.outflows {
            self.outflows.insert((outflow.at, outflow.user), outflow.amount);
        }
        for pool in changes.pools {
            self.pools.set(pool);
        }
        if let Some(system) = changes.system {
            self.system = system;
        }
    }
}

impl SponsorLookup for LedgerState {
    fn sponsor_of(&self, user: &Address) -> Option<Address> {
        self.users.get(user).and_then(|u| u.sponsor)
    }

    fn chain_bound(&self) -> u64 {
        self.users.len() as u64
    }
}

impl MatrixLookup for LedgerState {
    fn matrix_children(&self, parent: &Address) -> [Option<Address>; 2] {
        self.matrix.get(parent).copied().unwrap_or_default()
    }

    fn matrix_bound(&self) -> u64 {
        self.placements.len() as u64
    }
}

/// Everything an operation changed
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub users: Vec<UserAccount>,
    pub edges: Vec<ReferralEdge>,
    pub placements: Vec<MatrixPlacement>,
    pub pools: Vec<Pool>,
    pub system: Option<SystemState>,
    pub outflows: Vec<Outflow>,
    /// `(at, user)` keys of outflows that left the breaker window
    pub expired_outflows: Vec<(Timestamp, Address)>,
    pub events: Vec<LedgerEvent>,
}

impl ChangeSet {
    /// Nothing to persist
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.edges.is_empty()
            && self.placements.is_empty()
            && self.pools.is_empty()
            && self.system.is_none()
            && self.outflows.is_empty()
            && self.expired_outflows.is_empty()
    }
}

/// Read-only inputs of an operation
pub(crate) struct Env<'a> {
    pub config: &'a LedgerConfig,
    pub catalog: &'a PackageCatalog,
    pub oracles: &'a OracleSet,
    pub ctx: CallContext,
}

impl Env<'_> {
    /// Aggregate price over the feeds approved in `system`
    pub fn native_quote(&self, system: &SystemState) -> LedgerResult<PriceQuote> {
        if !system.oracles.iter().any(|id| self.oracles.is_attached(id)) {
            return Err(LedgerError::NativePaymentUnavailable);
        }
        Ok(self
            .oracles
            .aggregate(&system.oracles, system.min_oracles, &self.config.oracle, self.ctx.now)?)
    }
}

/// Pending changes over a committed state
pub(crate) struct LedgerTxn<'a> {
    base: &'a LedgerState,
    users: BTreeMap<Address, UserAccount>,
    edges: Vec<ReferralEdge>,
    placements: Vec<MatrixPlacement>,
    pools: PoolSet,
    system: SystemState,
    outflows: BTreeMap<OutflowKey, Amount>,
    expired_outflows: BTreeSet<OutflowKey>,
    events: Vec<LedgerEvent>,
}

impl<'a> LedgerTxn<'a> {
    pub fn new(base: &'a LedgerState) -> Self {
        Self {
            base,
            users: BTreeMap::new(),
            edges: Vec::new(),
            placements: Vec::new(),
            pools: base.pools,
            system: base.system.clone(),
            outflows: BTreeMap::new(),
            expired_outflows: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn user(&self, address: &Address) -> Option<&UserAccount> {
        self.users.get(address).or_else(|| self.base.user(address))
    }

    pub fn require_user(&self, address: &Address) -> LedgerResult<&UserAccount> {
        self.user(address).ok_or(LedgerError::NotRegistered(*address))
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.user(address).is_some()
    }

    /// Mutable access to a user, copying it into the overlay on first write
    pub fn user_mut(&mut self, address: &Address) -> LedgerResult<&mut UserAccount> {
        if !self.users.contains_key(address) {
            let committed = self
                .base
                .user(address)
                .ok_or(LedgerError::NotRegistered(*address))?
                .clone();
            self.users.insert(*address, committed);
        }
        self.users
            .get_mut(address)
            .ok_or(LedgerError::NotRegistered(*address))
    }

    pub fn insert_user(&mut self, user: UserAccount) {
        self.users.insert(user.address, user);
    }

    /// All users with pending changes applied, committed ones first
    pub fn users(&self) -> impl Iterator<Item = &UserAccount> + '_ {
        let committed = self
            .base
            .users
            .iter()
            .map(move |(address, user)| self.users.get(address).unwrap_or(user));
        let fresh = self
            .users
            .iter()
            .filter(move |(address, _)| !self.base.users.contains_key(*address))
            .map(|(_, user)| user);
        committed.chain(fresh)
    }

    /// Offer a reward; emits the credit and cap events. The caller decides
    /// where any forfeited amount goes.
    pub fn credit_user(
        &mut self,
        recipient: &Address,
        amount: Amount,
        kind: RewardKind,
        source: Option<Address>,
    ) -> LedgerResult<CreditOutcome> {
        let user = self.user_mut(recipient)?;
        let outcome = user.apply_credit(amount)?;
        let cap = user.earnings_cap;

        if outcome.credited > 0 {
            debug!("credit {} {} to {}", kind, outcome.credited, recipient);
            self.emit(LedgerEvent::RewardCredited {
                recipient: *recipient,
                source,
                kind,
                amount: outcome.credited,
            });
        }
        if outcome.cap_reached {
            self.emit(LedgerEvent::EarningsCapReached {
                user: *recipient,
                cap,
            });
        }
        Ok(outcome)
    }

    // =========================================================================
    // Referral edges
    // =========================================================================

    pub fn add_edge(&mut self, edge: ReferralEdge) {
        self.edges.push(edge);
    }

    pub fn add_placement(&mut self, placement: MatrixPlacement) {
        self.placements.push(placement);
    }

    // =========================================================================
    // Circuit-breaker window
    // =========================================================================

    /// Outflow in the breaker window ending at `now`, pending entries included
    pub fn window_outflow(&self, now: Timestamp) -> Amount {
        let start = self.system.window_start(now);
        let committed = self
            .base
            .outflows
            .iter()
            .filter(|(key, _)| !self.outflows.contains_key(*key));
        window_sum(committed, start).saturating_add(window_sum(self.outflows.iter(), start))
    }

    /// Add `amount` to `user`'s outflow at `now` and expire committed
    /// entries that fell out of the window
    pub fn record_outflow(&mut self, user: &Address, amount: Amount, now: Timestamp) -> LedgerResult<()> {
        let start = self.system.window_start(now);
        for key in self.base.outflows.keys().take_while(|(at, _)| *at <= start) {
            self.expired_outflows.insert(*key);
        }
        let key = (now, *user);
        let current = match self.outflows.get(&key) {
            Some(amount) => *amount,
            None => self.base.outflows.get(&key).copied().unwrap_or(0),
        };
        self.outflows.insert(key, checked_add(current, amount, "breaker window")?);
        Ok(())
    }

    // =========================================================================
    // Pools and system
    // =========================================================================

    pub fn pool(&self, kind: PoolKind) -> &Pool {
        self.pools.get(kind)
    }

    pub fn pool_mut(&mut self, kind: PoolKind) -> &mut Pool {
        self.pools.get_mut(kind)
    }

    /// Add to a pool and record the event
    pub fn accrue_pool(&mut self, kind: PoolKind, amount: Amount) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.pools.get_mut(kind).accrue(amount)?;
        self.emit(LedgerEvent::PoolCredited { pool: kind, amount });
        Ok(())
    }

    pub fn system(&self) -> &SystemState {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut SystemState {
        &mut self.system
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn into_changes(self) -> ChangeSet {
        let pools = PoolKind::ALL
            .iter()
            .map(|kind| *self.pools.get(*kind))
            .filter(|pool| pool != self.base.pools.get(pool.kind))
            .collect();
        let system = (self.system != self.base.system).then_some(self.system);
        ChangeSet {
            users: self.users.into_values().collect(),
            edges: self.edges,
            placements: self.placements,
            pools,
            system,
            outflows: self
                .outflows
                .into_iter()
                .map(|((at, user), amount)| Outflow { at, user, amount })
                .collect(),
            expired_outflows: self.expired_outflows.into_iter().collect(),
            events: self.events,
        }
    }
}

impl SponsorLookup for LedgerTxn<'_> {
    fn sponsor_of(&self, user: &Address) -> Option<Address> {
        self.user(user).and_then(|u| u.sponsor)
    }

    fn chain_bound(&self) -> u64 {
        self.system.total_users
    }
}

impl MatrixLookup for LedgerTxn<'_> {
    fn matrix_children(&self, parent: &Address) -> [Option<Address>; 2] {
        let mut children = self.base.matrix_children(parent);
        for placement in self.placements.iter().filter(|p| p.parent == *parent) {
            children[placement.side.index()] = Some(placement.user);
        }
        children
    }

    fn matrix_bound(&self) -> u64 {
        self.base.matrix_bound() + self.placements.len() as u64
    }
}
