//! Token gateway
//!
//! The ledger never moves tokens itself. It asks a [`TokenGateway`] to pull
//! payments in and push payouts out. Transfers issued between `begin` and
//! `commit` are one unit: `rollback` must undo every one of them, so a
//! failed ledger operation never strands a payment.

use std::collections::BTreeMap;

use lib_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Asset moved by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The stable token all accounting is denominated in
    Stable,
    /// Native chain currency, converted through the price oracle
    Native,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{account} holds {available} {asset:?}, transfer needs {requested}")]
    InsufficientFunds {
        account: Address,
        asset: Asset,
        available: Amount,
        requested: Amount,
    },

    #[error("Transfer rejected: {0}")]
    Rejected(String),

    #[error("Transfer batch already open")]
    BatchAlreadyOpen,

    #[error("Balance overflow")]
    Overflow,
}

pub trait TokenGateway {
    /// Open a transfer batch
    fn begin(&mut self) -> Result<(), TransferError>;

    /// Move `amount` of `asset` from `from` into ledger custody
    fn pull(&mut self, asset: Asset, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Move `amount` of `asset` from ledger custody to `to`
    fn push(&mut self, asset: Asset, to: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Finalize every transfer of the open batch
    fn commit(&mut self);

    /// Undo every transfer of the open batch
    fn rollback(&mut self);

    /// Units of `asset` currently held in ledger custody
    fn custody_balance(&self, asset: Asset) -> Amount;
}

/// Balances of one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalances {
    pub stable: Amount,
    pub native: Amount,
}

impl AssetBalances {
    fn slot(&mut self, asset: Asset) -> &mut Amount {
        match asset {
            Asset::Stable => &mut self.stable,
            Asset::Native => &mut self.native,
        }
    }

    pub fn get(&self, asset: Asset) -> Amount {
        match asset {
            Asset::Stable => self.stable,
            Asset::Native => self.native,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Book {
    accounts: BTreeMap<Address, AssetBalances>,
    custody: AssetBalances,
}

/// Book-entry gateway for tests and the operator sandbox
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTokenGateway {
    book: Book,
    #[serde(skip)]
    snapshot: Option<Book>,
    #[serde(skip)]
    pull_failure: Option<String>,
    #[serde(skip)]
    push_failure: Option<String>,
}

impl MemoryTokenGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an external account out of thin air (funding for tests)
    pub fn mint(&mut self, asset: Asset, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let slot = self.book.accounts.entry(*to).or_default().slot(asset);
        *slot = slot.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }

    pub fn balance_of(&self, asset: Asset, account: &Address) -> Amount {
        self.book
            .accounts
            .get(account)
            .map(|b| b.get(asset))
            .unwrap_or(0)
    }

    /// Every pull fails with `reason` until cleared
    pub fn fail_pulls(&mut self, reason: Option<String>) {
        self.pull_failure = reason;
    }

    /// Every push fails with `reason` until cleared
    pub fn fail_pushes(&mut self, reason: Option<String>) {
        self.push_failure = reason;
    }

    pub fn in_batch(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl TokenGateway for MemoryTokenGateway {
    fn begin(&mut self) -> Result<(), TransferError> {
        if self.snapshot.is_some() {
            return Err(TransferError::BatchAlreadyOpen);
        }
        self.snapshot = Some(self.book.clone());
        Ok(())
    }

    fn pull(&mut self, asset: Asset, from: &Address, amount: Amount) -> Result<(), TransferError> {
        if let Some(reason) = &self.pull_failure {
            return Err(TransferError::Rejected(reason.clone()));
        }
        let payer = self.book.accounts.entry(*from).or_default().slot(asset);
        if *payer < amount {
            return Err(TransferError::InsufficientFunds {
                account: *from,
                asset,
                available: *payer,
                requested: amount,
            });
        }
        *payer -= amount;
        let custody = self.book.custody.slot(asset);
        *custody = custody.checked_add(amount).ok_or(TransferError::Overflow)?;
        debug!("gateway pull {:?} {} from {}", asset, amount, from);
        Ok(())
    }

    fn push(&mut self, asset: Asset, to: &Address, amount: Amount) -> Result<(), TransferError> {
        if let Some(reason) = &self.push_failure {
            return Err(TransferError::Rejected(reason.clone()));
        }
        let custody = self.book.custody.slot(asset);
        if *custody < amount {
            return Err(TransferError::InsufficientFunds {
                account: Address::zero(),
                asset,
                available: *custody,
                requested: amount,
            });
        }
        *custody -= amount;
        let payee = self.book.accounts.entry(*to).or_default().slot(asset);
        *payee = payee.checked_add(amount).ok_or(TransferError::Overflow)?;
        debug!("gateway push {:?} {} to {}", asset, amount, to);
        Ok(())
    }

    fn commit(&mut self) {
        self.snapshot = None;
    }

    fn rollback(&mut self) {
        if let Some(book) = self.snapshot.take() {
            self.book = book;
        }
    }

    fn custody_balance(&self, asset: Asset) -> Amount {
        self.book.custody.get(asset)
    }
}
