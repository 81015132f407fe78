//! Ledger engine
//!
//! `Ledger` owns the committed state, the store and the token gateway. Every
//! mutating call runs through `transact`:
//!
//! 1. open a gateway batch
//! 2. run the operation against a `LedgerTxn` overlay
//! 3. on failure drop the overlay and roll the gateway back
//! 4. on success persist the touched records in one store transaction,
//!    commit the gateway batch, then merge the overlay into memory
//! 5. flush the store; a flush failure is logged and does not revert the
//!    already committed operation
//!
//! A failed call therefore leaves balances, pools, counters and custody
//! exactly as they were.

use std::sync::{Arc, Mutex};

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admin;
use crate::catalog::{PackageCatalog, PackageTier};
use crate::commission::{self, PaymentMethod, Registration, Upgrade};
use crate::config::{DistributionPolicy, LedgerConfig};
use crate::errors::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::gateway::{Asset, TokenGateway};
use crate::oracle::{OracleSet, PriceOracle, PriceQuote};
use crate::pools::{self, DistributionOutcome, Pool, PoolKind, PoolSet};
use crate::referral::{self, MatrixLookup, MatrixPlacement};
use crate::state::{ChangeSet, Env, LedgerState, LedgerTxn, StateParts, SystemState};
use crate::storage::{LedgerStore, StorageError, StorageResult};
use crate::user::UserAccount;
use crate::withdrawal::{self, PayoutAsset, WithdrawalReceipt, WithdrawalSplit};

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

/// Result of a committed operation with the events it emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt<T> {
    pub value: T,
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Clone, Copy)]
pub struct GenesisParams {
    pub owner: Address,
    pub root: Address,
    pub treasury: Address,
    /// Price feed approved from the start, if any
    pub oracle: Option<Address>,
    pub now: Timestamp,
}

/// Operational snapshot of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Not paused and the circuit breaker has headroom
    pub operational: bool,
    pub paused: bool,
    pub circuit_breaker_tripped: bool,
    pub window_outflow: Amount,
    pub total_users: u64,
    pub total_admin_fees: Amount,
    /// Every user balance plus every pool balance
    pub liabilities: Amount,
    pub custody_stable: Amount,
    pub custody_native: Amount,
    pub approved_oracles: u32,
    pub min_oracles: u32,
}

pub struct Ledger<S: LedgerStore, G: TokenGateway> {
    config: LedgerConfig,
    catalog: PackageCatalog,
    state: LedgerState,
    store: S,
    gateway: G,
    oracles: OracleSet,
}

impl<S: LedgerStore, G: TokenGateway> std::fmt::Debug for Ledger<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("total_users", &self.state.system().total_users)
            .field("paused", &self.state.system().paused)
            .field("store", &self.store)
            .field("oracles", &self.oracles)
            .finish_non_exhaustive()
    }
}

impl<S: LedgerStore, G: TokenGateway> Ledger<S, G> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Initialize an empty store with the root account, pools and settings
    pub fn genesis(config: LedgerConfig, store: S, gateway: G, params: GenesisParams) -> LedgerResult<Self> {
        config
            .validate()
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        let catalog = config
            .catalog()
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

        if params.owner.is_zero() {
            return Err(LedgerError::InvalidAddress("owner cannot be the zero address"));
        }
        if params.root.is_zero() {
            return Err(LedgerError::InvalidAddress("root cannot be the zero address"));
        }
        if params.treasury.is_zero() {
            return Err(LedgerError::InvalidAddress("treasury cannot be the zero address"));
        }
        if params.oracle.is_some_and(|oracle| oracle.is_zero()) {
            return Err(LedgerError::InvalidAddress("oracle cannot be the zero address"));
        }
        if store.get_system()?.is_some() {
            return Err(StorageError::AlreadyInitialized.into());
        }

        let root = UserAccount::new_root(params.root, catalog.top_tier(), params.now);
        let pools = PoolSet::new(&config, params.now);
        let mut system = SystemState::new(&config, params.owner, params.root, params.treasury, params.now);
        system.total_users = 1;
        system.oracles.extend(params.oracle);

        persist(
            &store,
            &ChangeSet {
                users: vec![root.clone()],
                pools: pools.iter().copied().collect(),
                system: Some(system.clone()),
                ..Default::default()
            },
        )?;
        flush(&store, "genesis");

        info!(
            "ledger initialized: root {}, owner {}, treasury {}",
            params.root, params.owner, params.treasury
        );

        Ok(Self {
            config,
            catalog,
            state: LedgerState::from_parts(
                StateParts {
                    users: vec![root],
                    ..Default::default()
                },
                pools,
                system,
            ),
            store,
            gateway,
            oracles: OracleSet::new(),
        })
    }

    /// Load a previously initialized store
    pub fn open(config: LedgerConfig, store: S, gateway: G) -> LedgerResult<Self> {
        config
            .validate()
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        let catalog = config
            .catalog()
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

        let system = store.get_system()?.ok_or(StorageError::NotInitialized)?;
        let parts = StateParts {
            users: store.load_users()?,
            edges: store.load_edges()?,
            placements: store.load_placements()?,
            outflows: store.load_outflows()?,
        };

        let mut pools = PoolSet::new(&config, system.genesis_at);
        for kind in PoolKind::ALL {
            match store.get_pool(*kind)? {
                Some(pool) => pools.set(pool),
                None => return Err(StorageError::CorruptedData(format!("{} pool record missing", kind)).into()),
            }
        }

        if parts.users.len() as u64 != system.total_users {
            return Err(StorageError::CorruptedData(format!(
                "{} user records but total_users is {}",
                parts.users.len(),
                system.total_users
            ))
            .into());
        }
        // Every member except the root holds one seat
        if parts.placements.len() as u64 != system.total_users.saturating_sub(1) {
            return Err(StorageError::CorruptedData(format!(
                "{} matrix seats for {} members",
                parts.placements.len(),
                system.total_users.saturating_sub(1)
            ))
            .into());
        }

        debug!("ledger opened with {} users", system.total_users);

        Ok(Self {
            config,
            catalog,
            state: LedgerState::from_parts(parts, pools, system),
            store,
            gateway,
            oracles: OracleSet::new(),
        })
    }

    /// Attach the price feed behind `id`. It is only consulted while `id`
    /// is approved (see [`Ledger::add_oracle`]).
    pub fn with_price_feed(mut self, id: Address, feed: Box<dyn PriceOracle>) -> Self {
        self.attach_price_feed(id, feed);
        self
    }

    pub fn attach_price_feed(&mut self, id: Address, feed: Box<dyn PriceOracle>) {
        if !self.state.system().oracles.contains(&id) {
            debug!("price feed {} attached but not approved", id);
        }
        self.oracles.attach(id, feed);
    }

    /// Returns whether a feed was attached under `id`
    pub fn detach_price_feed(&mut self, id: &Address) -> bool {
        self.oracles.detach(id).is_some()
    }

    // =========================================================================
    // User operations
    // =========================================================================

    pub fn register(
        &mut self,
        ctx: CallContext,
        sponsor: Address,
        tier: PackageTier,
        method: PaymentMethod,
    ) -> LedgerResult<Receipt<Registration>> {
        self.transact(ctx, "register", |txn, env, gateway| {
            commission::register(txn, env, gateway, sponsor, tier, method)
        })
    }

    pub fn upgrade_package(
        &mut self,
        ctx: CallContext,
        new_tier: PackageTier,
        method: PaymentMethod,
    ) -> LedgerResult<Receipt<Upgrade>> {
        self.transact(ctx, "upgrade", |txn, env, gateway| {
            commission::upgrade_package(txn, env, gateway, new_tier, method)
        })
    }

    /// Withdraw, paying out in whichever asset custody can cover
    pub fn withdraw(&mut self, ctx: CallContext, amount: Amount) -> LedgerResult<Receipt<WithdrawalReceipt>> {
        self.withdraw_in(ctx, amount, PayoutAsset::Auto)
    }

    pub fn withdraw_in(
        &mut self,
        ctx: CallContext,
        amount: Amount,
        payout: PayoutAsset,
    ) -> LedgerResult<Receipt<WithdrawalReceipt>> {
        self.transact(ctx, "withdraw", |txn, env, gateway| {
            withdrawal::withdraw(txn, env, gateway, amount, payout)
        })
    }

    pub fn set_auto_compound(&mut self, ctx: CallContext, enabled: bool) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_auto_compound", |txn, env, _| {
            withdrawal::set_auto_compound(txn, env, enabled)
        })
    }

    /// Distribute `kind` if its interval has elapsed; a second call inside
    /// the same interval returns `NotDue` and changes nothing
    pub fn trigger_distribution(
        &mut self,
        ctx: CallContext,
        kind: PoolKind,
    ) -> LedgerResult<Receipt<DistributionOutcome>> {
        self.transact(ctx, "trigger_distribution", |txn, env, _| {
            pools::trigger_distribution(txn, env, kind)
        })
    }

    // =========================================================================
    // Admin operations
    // =========================================================================

    pub fn pause(&mut self, ctx: CallContext) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "pause", |txn, env, _| admin::pause(txn, env))
    }

    pub fn unpause(&mut self, ctx: CallContext) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "unpause", |txn, env, _| admin::unpause(txn, env))
    }

    pub fn set_treasury(&mut self, ctx: CallContext, treasury: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_treasury", |txn, env, _| {
            admin::set_treasury(txn, env, treasury)
        })
    }

    /// `threshold` in base units; 0 disables the breaker
    pub fn set_circuit_breaker(
        &mut self,
        ctx: CallContext,
        threshold: Amount,
        window_secs: u64,
    ) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_circuit_breaker", |txn, env, _| {
            admin::set_circuit_breaker(txn, env, threshold, window_secs)
        })
    }

    pub fn set_daily_withdrawal_limit(
        &mut self,
        ctx: CallContext,
        limit: Option<Amount>,
    ) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_daily_withdrawal_limit", |txn, env, _| {
            admin::set_daily_withdrawal_limit(txn, env, limit)
        })
    }

    pub fn set_distribution_policy(
        &mut self,
        ctx: CallContext,
        policy: DistributionPolicy,
    ) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_distribution_policy", |txn, env, _| {
            admin::set_distribution_policy(txn, env, policy)
        })
    }

    pub fn blacklist(&mut self, ctx: CallContext, user: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "blacklist", |txn, env, _| {
            admin::set_blacklisted(txn, env, user, true)
        })
    }

    pub fn unblacklist(&mut self, ctx: CallContext, user: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "unblacklist", |txn, env, _| {
            admin::set_blacklisted(txn, env, user, false)
        })
    }

    pub fn add_admin(&mut self, ctx: CallContext, admin: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "add_admin", |txn, env, _| admin::add_admin(txn, env, admin))
    }

    pub fn remove_admin(&mut self, ctx: CallContext, admin: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "remove_admin", |txn, env, _| {
            admin::remove_admin(txn, env, admin)
        })
    }

    pub fn add_oracle(&mut self, ctx: CallContext, oracle: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "add_oracle", |txn, env, _| admin::add_oracle(txn, env, oracle))
    }

    pub fn remove_oracle(&mut self, ctx: CallContext, oracle: Address) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "remove_oracle", |txn, env, _| {
            admin::remove_oracle(txn, env, oracle)
        })
    }

    pub fn set_min_oracles(&mut self, ctx: CallContext, min_oracles: u32) -> LedgerResult<Receipt<()>> {
        self.transact(ctx, "set_min_oracles", |txn, env, _| {
            admin::set_min_oracles(txn, env, min_oracles)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn user(&self, address: &Address) -> Option<&UserAccount> {
        self.state.user(address)
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.state.user(address).is_some()
    }

    pub fn users(&self) -> impl Iterator<Item = &UserAccount> {
        self.state.users()
    }

    pub fn pool(&self, kind: PoolKind) -> &Pool {
        self.state.pools().get(kind)
    }

    pub fn pools(&self) -> &PoolSet {
        self.state.pools()
    }

    pub fn total_users(&self) -> u64 {
        self.state.system().total_users
    }

    /// Up to `depth` ancestors of `user`, nearest first
    pub fn ancestors_of(&self, user: &Address, depth: usize) -> Vec<Address> {
        referral::ancestors_of(&self.state, user, depth).as_slice().to_vec()
    }

    pub fn direct_referral_count_of(&self, user: &Address) -> LedgerResult<u32> {
        self.require_user(user).map(|u| u.direct_referral_count)
    }

    pub fn team_size_of(&self, user: &Address) -> LedgerResult<u64> {
        self.require_user(user).map(|u| u.team_size)
    }

    pub fn referrals_of(&self, sponsor: &Address) -> Vec<Address> {
        self.state.referrals_of(sponsor)
    }

    pub fn package_catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// Seat of `user` in the placement matrix; `None` for the root
    pub fn matrix_position(&self, user: &Address) -> Option<&MatrixPlacement> {
        self.state.matrix_placement(user)
    }

    /// `[left, right]` seats directly below `user`
    pub fn matrix_children(&self, user: &Address) -> [Option<Address>; 2] {
        self.state.matrix_children(user)
    }

    /// Aggregated native price the ledger would use at `now`
    pub fn native_price(&self, now: Timestamp) -> LedgerResult<PriceQuote> {
        let env = self.env(CallContext::new(self.state.system().owner, now));
        env.native_quote(self.state.system())
    }

    pub fn system_health(&self, now: Timestamp) -> SystemHealth {
        let system = self.state.system();
        let window_outflow = self.state.window_outflow(now);
        let tripped = system.circuit_breaker_threshold > 0 && window_outflow >= system.circuit_breaker_threshold;
        let liabilities = self
            .state
            .users()
            .fold(self.state.pools().total_balance(), |acc, user| acc.saturating_add(user.balance));
        SystemHealth {
            operational: !system.paused && !tripped,
            paused: system.paused,
            circuit_breaker_tripped: tripped,
            window_outflow,
            total_users: system.total_users,
            total_admin_fees: system.total_admin_fees,
            liabilities,
            custody_stable: self.gateway.custody_balance(Asset::Stable),
            custody_native: self.gateway.custody_balance(Asset::Native),
            approved_oracles: system.oracles.len() as u32,
            min_oracles: system.min_oracles,
        }
    }

    /// Split a withdrawal of `amount` would produce right now
    pub fn withdrawal_quote(&self, user: &Address, amount: Amount) -> LedgerResult<WithdrawalSplit> {
        let account = self.require_user(user)?;
        WithdrawalSplit::for_user(account, amount, &self.config)
    }

    pub fn system(&self) -> &SystemState {
        self.state.system()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, G) {
        (self.store, self.gateway)
    }

    fn require_user(&self, user: &Address) -> LedgerResult<&UserAccount> {
        self.state.user(user).ok_or(LedgerError::NotRegistered(*user))
    }

    fn env(&self, ctx: CallContext) -> Env<'_> {
        Env {
            config: &self.config,
            catalog: &self.catalog,
            oracles: &self.oracles,
            ctx,
        }
    }

    // =========================================================================
    // Transaction driver
    // =========================================================================

    fn transact<T>(
        &mut self,
        ctx: CallContext,
        op: &'static str,
        body: impl FnOnce(&mut LedgerTxn<'_>, &Env<'_>, &mut G) -> LedgerResult<T>,
    ) -> LedgerResult<Receipt<T>> {
        self.gateway.begin().map_err(LedgerError::Gateway)?;

        let env = Env {
            config: &self.config,
            catalog: &self.catalog,
            oracles: &self.oracles,
            ctx,
        };
        let mut txn = LedgerTxn::new(&self.state);

        let value = match body(&mut txn, &env, &mut self.gateway) {
            Ok(value) => value,
            Err(e) => {
                drop(txn);
                self.gateway.rollback();
                warn!("{} by {} reverted: {}", op, ctx.caller, e);
                return Err(e);
            }
        };

        let mut changes = txn.into_changes();
        if !changes.is_empty() {
            if let Err(e) = persist(&self.store, &changes) {
                self.gateway.rollback();
                warn!("{} by {} reverted, store write failed: {}", op, ctx.caller, e);
                return Err(e.into());
            }
            flush(&self.store, op);
        }
        self.gateway.commit();

        let events = std::mem::take(&mut changes.events);
        self.state.apply(changes);
        debug!("{} by {} committed with {} events", op, ctx.caller, events.len());

        Ok(Receipt { value, events })
    }
}

/// Write every touched record in one store transaction
fn persist<S: LedgerStore + ?Sized>(store: &S, changes: &ChangeSet) -> StorageResult<()> {
    store.begin()?;
    if let Err(e) = stage(store, changes) {
        if let Err(rollback) = store.rollback() {
            warn!("store rollback failed: {}", rollback);
        }
        return Err(e);
    }
    store.commit()
}

/// Committed records are final; a failed flush only loses durability
fn flush<S: LedgerStore + ?Sized>(store: &S, op: &str) {
    if let Err(e) = store.flush() {
        warn!("{} committed but the store flush failed: {}", op, e);
    }
}

fn stage<S: LedgerStore + ?Sized>(store: &S, changes: &ChangeSet) -> StorageResult<()> {
    for user in &changes.users {
        store.put_user(user)?;
    }
    for edge in &changes.edges {
        store.put_edge(edge)?;
    }
    for placement in &changes.placements {
        store.put_placement(placement)?;
    }
    for (at, user) in &changes.expired_outflows {
        store.remove_outflow(*at, user)?;
    }
    for outflow in &changes.outflows {
        store.put_outflow(outflow)?;
    }
    for pool in &changes.pools {
        store.put_pool(pool)?;
    }
    if let Some(system) = &changes.system {
        store.put_system(system)?;
    }
    Ok(())
}

/// Thread-safe handle serializing every call through one lock
pub struct SharedLedger<S: LedgerStore, G: TokenGateway> {
    inner: Arc<Mutex<Ledger<S, G>>>,
}

impl<S: LedgerStore, G: TokenGateway> Clone for SharedLedger<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LedgerStore, G: TokenGateway> SharedLedger<S, G> {
    pub fn new(ledger: Ledger<S, G>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Run `f` with exclusive access to the ledger
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger<S, G>) -> LedgerResult<R>) -> LedgerResult<R> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        f(&mut guard)
    }
}
