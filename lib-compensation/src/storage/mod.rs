//! Ledger Storage Layer
//!
//! All persistence goes through the `LedgerStore` trait.
//!
//! # Data Model Invariants
//!
//! 1. **Writes only occur inside begin → commit** - every record an operation
//!    touched is written in one atomic store transaction.
//! 2. **Rollback restores the exact pre-operation state** - nothing written
//!    after `begin` survives `rollback`.
//! 3. **A successful `commit` is final** - `flush` only adds durability and
//!    its failure never undoes a commit.
//! 4. **Users, edges and matrix seats are keyed by address, pools by kind,
//!    breaker outflows by time** - see `keys.rs`.
//!
//! The ledger keeps a full in-memory copy of committed state; the store is
//! read once at open and written after every committed operation.

pub mod keys;
pub mod sled_store;

use thiserror::Error;

use lib_types::{Address, Timestamp};

use crate::pools::{Pool, PoolKind};
use crate::referral::{MatrixPlacement, ReferralEdge};
use crate::state::{Outflow, SystemState};
use crate::user::UserAccount;

pub use sled_store::SledStore;

/// Storage layer result type
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Transaction already active")]
    TransactionAlreadyActive,

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Ledger store is not initialized")]
    NotInitialized,

    #[error("Ledger store is already initialized")]
    AlreadyInitialized,

    #[error("Unsupported schema version {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Persistence contract of the ledger
pub trait LedgerStore: Send + std::fmt::Debug {
    // =========================================================================
    // Transaction control
    // =========================================================================

    fn begin(&self) -> StorageResult<()>;

    fn commit(&self) -> StorageResult<()>;

    fn rollback(&self) -> StorageResult<()>;

    /// Push committed writes to durable media
    fn flush(&self) -> StorageResult<()>;

    // =========================================================================
    // Writes (inside a transaction)
    // =========================================================================

    fn put_user(&self, user: &UserAccount) -> StorageResult<()>;

    fn put_edge(&self, edge: &ReferralEdge) -> StorageResult<()>;

    fn put_pool(&self, pool: &Pool) -> StorageResult<()>;

    fn put_system(&self, system: &SystemState) -> StorageResult<()>;

    fn put_placement(&self, placement: &MatrixPlacement) -> StorageResult<()>;

    fn put_outflow(&self, outflow: &Outflow) -> StorageResult<()>;

    fn remove_outflow(&self, at: Timestamp, user: &Address) -> StorageResult<()>;

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_pool(&self, kind: PoolKind) -> StorageResult<Option<Pool>>;

    fn get_system(&self) -> StorageResult<Option<SystemState>>;

    fn load_users(&self) -> StorageResult<Vec<UserAccount>>;

    fn load_edges(&self) -> StorageResult<Vec<ReferralEdge>>;

    fn load_placements(&self) -> StorageResult<Vec<MatrixPlacement>>;

    /// Breaker outflows in time order
    fn load_outflows(&self) -> StorageResult<Vec<Outflow>>;
}
