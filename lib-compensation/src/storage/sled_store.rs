//! Sled-based LedgerStore implementation
//!
//! Writes are buffered per tree between `begin` and `commit`, then applied in
//! a single multi-tree sled transaction. `flush` is a separate step the
//! ledger runs after a commit it has already accepted.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use sled::transaction::ConflictableTransactionError;
use sled::{Batch, Db, Transactional, Tree};
use tracing::debug;

use lib_types::{Address, Timestamp};

use super::{keys, LedgerStore, StorageError, StorageResult};
use crate::pools::{Pool, PoolKind};
use crate::referral::{MatrixPlacement, ReferralEdge};
use crate::state::{Outflow, SystemState};
use crate::user::UserAccount;

// =============================================================================
// TREE NAMES (FIXED - DO NOT CHANGE)
// =============================================================================
// These names are part of the on-disk format.
// =============================================================================

const TREE_USERS: &str = "users";
const TREE_REFERRALS: &str = "referrals";
const TREE_POOLS: &str = "pools";
const TREE_META: &str = "meta";
const TREE_MATRIX: &str = "matrix";
const TREE_OUTFLOWS: &str = "outflows";

pub const SCHEMA_VERSION: u32 = 2;

/// Sled-based implementation of LedgerStore
pub struct SledStore {
    db: Db,

    users: Tree,
    referrals: Tree,
    pools: Tree,
    meta: Tree,
    matrix: Tree,
    outflows: Tree,

    tx_active: AtomicBool,
    tx_batch: Mutex<Option<PendingBatch>>,
}

/// Buffered changes for atomic commit
struct PendingBatch {
    users: Batch,
    referrals: Batch,
    pools: Batch,
    meta: Batch,
    matrix: Batch,
    outflows: Batch,
    writes: usize,
}

impl PendingBatch {
    fn new() -> Self {
        Self {
            users: Batch::default(),
            referrals: Batch::default(),
            pools: Batch::default(),
            meta: Batch::default(),
            matrix: Batch::default(),
            outflows: Batch::default(),
            writes: 0,
        }
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("tx_active", &self.tx_active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SledStore {
    /// Open or create a SledStore at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::from_db(db)
    }

    /// Open a temporary store, removed on drop
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| StorageError::Database(e.to_string()))
        };
        let users = open(TREE_USERS)?;
        let referrals = open(TREE_REFERRALS)?;
        let pools = open(TREE_POOLS)?;
        let meta = open(TREE_META)?;
        let matrix = open(TREE_MATRIX)?;
        let outflows = open(TREE_OUTFLOWS)?;

        let store = Self {
            db,
            users,
            referrals,
            pools,
            meta,
            matrix,
            outflows,
            tx_active: AtomicBool::new(false),
            tx_batch: Mutex::new(None),
        };
        store.check_schema_version()?;
        Ok(store)
    }

    /// Read one user record straight from disk
    pub fn get_user(&self, address: &Address) -> StorageResult<Option<UserAccount>> {
        Self::get_value(&self.users, keys::user_key(address))
    }

    /// Direct referrals of `sponsor` in address order, read from disk
    pub fn referrals_of(&self, sponsor: &Address) -> StorageResult<Vec<Address>> {
        self.referrals
            .scan_prefix(keys::referral_prefix(sponsor))
            .keys()
            .map(|item| {
                let key = item.map_err(|e| StorageError::Database(e.to_string()))?;
                keys::parse_referral_key(&key)
                    .map(|(_, referred)| referred)
                    .ok_or_else(|| StorageError::CorruptedData("Invalid referral key".to_string()))
            })
            .collect()
    }

    fn check_schema_version(&self) -> StorageResult<()> {
        match self.meta.get(keys::meta::SCHEMA_VERSION) {
            Ok(Some(bytes)) => {
                let raw: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                    StorageError::CorruptedData("Invalid schema_version length".to_string())
                })?;
                let found = u32::from_be_bytes(raw);
                if found != SCHEMA_VERSION {
                    return Err(StorageError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(StorageError::Database(e.to_string())),
        }
    }

    /// Check if a transaction is active
    fn require_transaction(&self) -> StorageResult<()> {
        if !self.tx_active.load(Ordering::SeqCst) {
            return Err(StorageError::NoActiveTransaction);
        }
        Ok(())
    }

    fn batch(&self) -> StorageResult<MutexGuard<'_, Option<PendingBatch>>> {
        self.tx_batch.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Buffer a write into the pending batch of one tree
    fn stage(
        &self,
        select: fn(&mut PendingBatch) -> &mut Batch,
        key: &[u8],
        value: Vec<u8>,
    ) -> StorageResult<()> {
        self.require_transaction()?;
        let mut guard = self.batch()?;
        let pending = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        select(pending).insert(key, value);
        pending.writes += 1;
        Ok(())
    }

    /// Buffer a delete into the pending batch of one tree
    fn stage_remove(&self, select: fn(&mut PendingBatch) -> &mut Batch, key: &[u8]) -> StorageResult<()> {
        self.require_transaction()?;
        let mut guard = self.batch()?;
        let pending = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        select(pending).remove(key);
        pending.writes += 1;
        Ok(())
    }

    /// Helper to serialize a value
    fn serialize<T: serde::Serialize>(value: &T) -> StorageResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Helper to deserialize a value
    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(tree: &Tree, key: &[u8]) -> StorageResult<Option<T>> {
        match tree.get(key) {
            Ok(Some(bytes)) => Ok(Some(Self::deserialize(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Database(e.to_string())),
        }
    }

    fn load_all<T: serde::de::DeserializeOwned>(tree: &Tree) -> StorageResult<Vec<T>> {
        tree.iter()
            .values()
            .map(|item| {
                let bytes = item.map_err(|e| StorageError::Database(e.to_string()))?;
                Self::deserialize(&bytes)
            })
            .collect()
    }
}

impl LedgerStore for SledStore {
    // =========================================================================
    // Transaction Control
    // =========================================================================

    fn begin(&self) -> StorageResult<()> {
        if self.tx_active.swap(true, Ordering::SeqCst) {
            return Err(StorageError::TransactionAlreadyActive);
        }
        match self.batch() {
            Ok(mut guard) => {
                *guard = Some(PendingBatch::new());
                Ok(())
            }
            Err(e) => {
                self.tx_active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn commit(&self) -> StorageResult<()> {
        self.require_transaction()?;

        let batch = {
            let mut guard = self.batch()?;
            guard.take().ok_or(StorageError::NoActiveTransaction)?
        };
        // Clear before applying so a failed commit leaves no open transaction
        self.tx_active.store(false, Ordering::SeqCst);

        let mut meta = batch.meta;
        meta.insert(keys::meta::SCHEMA_VERSION, SCHEMA_VERSION.to_be_bytes().to_vec());

        (
            &self.users,
            &self.referrals,
            &self.pools,
            &self.meta,
            &self.matrix,
            &self.outflows,
        )
            .transaction(|(users, referrals, pools, meta_tree, matrix, outflows)| {
                users.apply_batch(&batch.users)?;
                referrals.apply_batch(&batch.referrals)?;
                pools.apply_batch(&batch.pools)?;
                meta_tree.apply_batch(&meta)?;
                matrix.apply_batch(&batch.matrix)?;
                outflows.apply_batch(&batch.outflows)?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| StorageError::Database(format!("{:?}", e)))?;

        debug!("ledger store committed {} records", batch.writes);
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        self.require_transaction()?;

        *self.batch()? = None;
        self.tx_active.store(false, Ordering::SeqCst);

        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.db
            .flush()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn put_user(&self, user: &UserAccount) -> StorageResult<()> {
        let value = Self::serialize(user)?;
        self.stage(|b| &mut b.users, keys::user_key(&user.address), value)
    }

    fn put_edge(&self, edge: &ReferralEdge) -> StorageResult<()> {
        let value = Self::serialize(edge)?;
        let key = keys::referral_key(&edge.sponsor, &edge.referred);
        self.stage(|b| &mut b.referrals, &key, value)
    }

    fn put_pool(&self, pool: &Pool) -> StorageResult<()> {
        let value = Self::serialize(pool)?;
        self.stage(|b| &mut b.pools, &keys::pool_key(pool.kind), value)
    }

    fn put_system(&self, system: &SystemState) -> StorageResult<()> {
        let value = Self::serialize(system)?;
        self.stage(|b| &mut b.meta, keys::meta::SYSTEM, value)
    }

    fn put_placement(&self, placement: &MatrixPlacement) -> StorageResult<()> {
        let value = Self::serialize(placement)?;
        self.stage(|b| &mut b.matrix, keys::matrix_key(&placement.user), value)
    }

    fn put_outflow(&self, outflow: &Outflow) -> StorageResult<()> {
        let value = Self::serialize(outflow)?;
        self.stage(|b| &mut b.outflows, &keys::outflow_key(outflow.at, &outflow.user), value)
    }

    fn remove_outflow(&self, at: Timestamp, user: &Address) -> StorageResult<()> {
        self.stage_remove(|b| &mut b.outflows, &keys::outflow_key(at, user))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_pool(&self, kind: PoolKind) -> StorageResult<Option<Pool>> {
        Self::get_value(&self.pools, &keys::pool_key(kind))
    }

    fn get_system(&self) -> StorageResult<Option<SystemState>> {
        Self::get_value(&self.meta, keys::meta::SYSTEM)
    }

    fn load_users(&self) -> StorageResult<Vec<UserAccount>> {
        Self::load_all(&self.users)
    }

    fn load_edges(&self) -> StorageResult<Vec<ReferralEdge>> {
        Self::load_all(&self.referrals)
    }

    fn load_placements(&self) -> StorageResult<Vec<MatrixPlacement>> {
        Self::load_all(&self.matrix)
    }

    fn load_outflows(&self) -> StorageResult<Vec<Outflow>> {
        Self::load_all(&self.outflows)
    }
}

// =============================================================================
// TESTS
// =============================================================================
