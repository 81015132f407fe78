//! Layout of a ledger data directory

use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};

/// `<data>/ledger` holds the sled store, `<data>/gateway.bin` the sandbox
/// token book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub ledger: PathBuf,
    pub gateway: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl AsRef<Path>) -> CliResult<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(CliError::InvalidArgument("data directory cannot be empty".to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            ledger: root.join("ledger"),
            gateway: root.join("gateway.bin"),
        })
    }

    /// Scratch file the token book is written to before being renamed over
    /// `gateway`
    pub fn gateway_staging(&self) -> PathBuf {
        self.gateway.with_extension("bin.tmp")
    }

    pub fn is_initialized(&self) -> bool {
        self.ledger.is_dir() && self.gateway.is_file()
    }
}
