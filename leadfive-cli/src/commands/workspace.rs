//! Ledger workspace on disk
//!
//! A workspace is a sled store plus the sandbox token book the ledger pulls
//! from and pays into. The book is written after every mutating command,
//! through a staging file renamed into place.

use std::fs;

use lib_compensation::{
    Address, GenesisParams, Ledger, LedgerConfig, MemoryTokenGateway, SledStore, StorageError,
};
use tracing::{debug, info};

use crate::error::{CliError, CliResult};
use crate::logic::DataPaths;

pub type OperatorLedger = Ledger<SledStore, MemoryTokenGateway>;

/// Id of the price feed `--native-price` attaches; approved at init
pub const SANDBOX_FEED: Address = Address::new([0xFE; 20]);

pub struct Workspace {
    paths: DataPaths,
    pub ledger: OperatorLedger,
}

impl Workspace {
    /// Create the data directory and run genesis
    pub fn init(paths: DataPaths, config: LedgerConfig, params: GenesisParams) -> CliResult<Self> {
        if paths.is_initialized() {
            return Err(CliError::AlreadyInitialized(paths.root.clone()));
        }
        fs::create_dir_all(&paths.root)?;

        let store = SledStore::open(&paths.ledger)?;
        let ledger = Ledger::genesis(config, store, MemoryTokenGateway::new(), params)?;
        let workspace = Self { paths, ledger };
        workspace.save()?;

        info!("workspace created at {}", workspace.paths.root.display());
        Ok(workspace)
    }

    pub fn open(paths: DataPaths, config: LedgerConfig) -> CliResult<Self> {
        if !paths.is_initialized() {
            return Err(CliError::NotInitialized(paths.root.clone()));
        }

        let bytes = fs::read(&paths.gateway)?;
        let gateway: MemoryTokenGateway = bincode::deserialize(&bytes)
            .map_err(|e| CliError::Sandbox(format!("cannot decode {}: {}", paths.gateway.display(), e)))?;

        let store = SledStore::open(&paths.ledger)?;
        let ledger = Ledger::open(config, store, gateway).map_err(|e| match e {
            lib_compensation::LedgerError::Storage(StorageError::NotInitialized) => {
                CliError::NotInitialized(paths.root.clone())
            }
            other => other.into(),
        })?;

        debug!("workspace opened at {}", paths.root.display());
        Ok(Self { paths, ledger })
    }

    /// Persist the token book
    pub fn save(&self) -> CliResult<()> {
        let bytes = bincode::serialize(self.ledger.gateway())
            .map_err(|e| CliError::Sandbox(format!("cannot encode token book: {}", e)))?;
        let staging = self.paths.gateway_staging();
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.paths.gateway)?;
        Ok(())
    }

    pub fn decimals(&self) -> u8 {
        self.ledger.config().token_decimals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_compensation::Asset;

    fn params() -> GenesisParams {
        GenesisParams {
            owner: Address::new([0xA0; 20]),
            root: Address::new([0xA1; 20]),
            treasury: Address::new([0xA2; 20]),
            oracle: Some(SANDBOX_FEED),
            now: 1_700_000_000,
        }
    }

    #[test]
    fn test_open_before_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        let result = Workspace::open(paths, LedgerConfig::default());
        assert!(matches!(result, Err(CliError::NotInitialized(_))));
    }

    #[test]
    fn test_token_book_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        let holder = Address::new([7; 20]);

        {
            let mut workspace = Workspace::init(paths.clone(), LedgerConfig::default(), params()).unwrap();
            workspace.ledger.gateway_mut().mint(Asset::Stable, &holder, 42).unwrap();
            workspace.save().unwrap();
        }

        let workspace = Workspace::open(paths, LedgerConfig::default()).unwrap();
        assert_eq!(workspace.ledger.gateway().balance_of(Asset::Stable, &holder), 42);
        assert_eq!(workspace.ledger.total_users(), 1);
        assert!(workspace.ledger.system().oracles.contains(&SANDBOX_FEED));
    }

    #[test]
    fn test_init_twice_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        drop(Workspace::init(paths.clone(), LedgerConfig::default(), params()).unwrap());

        let again = Workspace::init(paths, LedgerConfig::default(), params());
        assert!(matches!(again, Err(CliError::AlreadyInitialized(_))));
    }
}
