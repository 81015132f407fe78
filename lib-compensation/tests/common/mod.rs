//! Shared fixtures for ledger integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lib_compensation::{
    Address, Amount, Asset, CallContext, GenesisParams, Ledger, LedgerConfig, LedgerResult, LedgerStore,
    MatrixPlacement, MemoryTokenGateway, Outflow, PackageTier, PaymentMethod, Pool, PoolKind, Receipt,
    ReferralEdge, Registration, SledStore, StorageError, StorageResult, SystemState, Timestamp, UserAccount,
};

pub const UNIT: Amount = 1_000_000_000_000_000_000;
pub const GENESIS: Timestamp = 1_700_000_000;
pub const DAY: u64 = 86_400;

pub type TestLedger = Ledger<SledStore, MemoryTokenGateway>;

pub fn addr(n: u8) -> Address {
    Address::new([n; 20])
}

pub fn owner() -> Address {
    addr(0xA0)
}

pub fn root() -> Address {
    addr(0xA1)
}

pub fn treasury() -> Address {
    addr(0xA2)
}

/// Price feed approved at genesis
pub fn feed_id() -> Address {
    addr(0xA3)
}

pub fn tokens(n: u128) -> Amount {
    n * UNIT
}

pub fn ctx(caller: Address, now: Timestamp) -> CallContext {
    CallContext::new(caller, now)
}

pub fn genesis_params() -> GenesisParams {
    GenesisParams {
        owner: owner(),
        root: root(),
        treasury: treasury(),
        oracle: Some(feed_id()),
        now: GENESIS,
    }
}

pub fn ledger() -> TestLedger {
    ledger_with(LedgerConfig::default())
}

pub fn ledger_with(config: LedgerConfig) -> TestLedger {
    let store = SledStore::open_temporary().expect("temporary store");
    Ledger::genesis(config, store, MemoryTokenGateway::new(), genesis_params()).expect("genesis")
}

/// Mint the package price to `user` and register it
pub fn join<S: LedgerStore>(
    ledger: &mut Ledger<S, MemoryTokenGateway>,
    user: Address,
    sponsor: Address,
    tier: PackageTier,
) -> LedgerResult<Receipt<Registration>> {
    let price = ledger.package_catalog().require(tier)?.price;
    ledger
        .gateway_mut()
        .mint(Asset::Stable, &user, price)
        .expect("mint");
    ledger.register(ctx(user, GENESIS + 60), sponsor, tier, PaymentMethod::Stable)
}

/// Sum of every user balance and pool balance
pub fn ledger_liabilities<S: LedgerStore>(ledger: &Ledger<S, MemoryTokenGateway>) -> Amount {
    let balances: Amount = ledger.users().map(|u| u.balance).sum();
    balances + ledger.pools().total_balance()
}

/// Store whose commits fail while the returned flag is set
#[derive(Debug)]
pub struct FailingStore {
    inner: SledStore,
    fail_commits: Arc<AtomicBool>,
    fail_flushes: Arc<AtomicBool>,
}

impl FailingStore {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let (store, fail_commits, _) = Self::with_flush_failures();
        (store, fail_commits)
    }

    /// Also returns a flag that makes `flush` fail after a commit applied
    pub fn with_flush_failures() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
        let fail_commits = Arc::new(AtomicBool::new(false));
        let fail_flushes = Arc::new(AtomicBool::new(false));
        let store = Self {
            inner: SledStore::open_temporary().expect("temporary store"),
            fail_commits: Arc::clone(&fail_commits),
            fail_flushes: Arc::clone(&fail_flushes),
        };
        (store, fail_commits, fail_flushes)
    }

    pub fn inner(&self) -> &SledStore {
        &self.inner
    }
}

impl LedgerStore for FailingStore {
    fn begin(&self) -> StorageResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> StorageResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            self.inner.rollback()?;
            return Err(StorageError::Database("injected commit failure".to_string()));
        }
        self.inner.commit()
    }

    fn rollback(&self) -> StorageResult<()> {
        self.inner.rollback()
    }

    fn flush(&self) -> StorageResult<()> {
        if self.fail_flushes.load(Ordering::SeqCst) {
            return Err(StorageError::Database("injected flush failure".to_string()));
        }
        self.inner.flush()
    }

    fn put_user(&self, user: &UserAccount) -> StorageResult<()> {
        self.inner.put_user(user)
    }

    fn put_edge(&self, edge: &ReferralEdge) -> StorageResult<()> {
        self.inner.put_edge(edge)
    }

    fn put_pool(&self, pool: &Pool) -> StorageResult<()> {
        self.inner.put_pool(pool)
    }

    fn put_system(&self, system: &SystemState) -> StorageResult<()> {
        self.inner.put_system(system)
    }

    fn put_placement(&self, placement: &MatrixPlacement) -> StorageResult<()> {
        self.inner.put_placement(placement)
    }

    fn put_outflow(&self, outflow: &Outflow) -> StorageResult<()> {
        self.inner.put_outflow(outflow)
    }

    fn remove_outflow(&self, at: Timestamp, user: &Address) -> StorageResult<()> {
        self.inner.remove_outflow(at, user)
    }

    fn get_pool(&self, kind: PoolKind) -> StorageResult<Option<Pool>> {
        self.inner.get_pool(kind)
    }

    fn get_system(&self) -> StorageResult<Option<SystemState>> {
        self.inner.get_system()
    }

    fn load_users(&self) -> StorageResult<Vec<UserAccount>> {
        self.inner.load_users()
    }

    fn load_edges(&self) -> StorageResult<Vec<ReferralEdge>> {
        self.inner.load_edges()
    }

    fn load_placements(&self) -> StorageResult<Vec<MatrixPlacement>> {
        self.inner.load_placements()
    }

    fn load_outflows(&self) -> StorageResult<Vec<Outflow>> {
        self.inner.load_outflows()
    }
}
