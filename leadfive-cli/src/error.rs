//! Structured error types for the LeadFive CLI

use std::path::PathBuf;

use lib_compensation::{ConfigError, LedgerError, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    // Ledger
    #[error("Ledger rejected the operation: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Storage(#[from] StorageError),

    #[error("No ledger at {0}; run `leadfive init` first")]
    NotInitialized(PathBuf),

    #[error("A ledger already exists at {0}")]
    AlreadyInitialized(PathBuf),

    // Sandbox token book
    #[error("Sandbox token book error: {0}")]
    Sandbox(String),

    // Input
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // I/O operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // Serialization
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::Other(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_amount_error() {
        let err = CliError::InvalidAmount {
            input: "1.2.3".to_string(),
            reason: "more than one decimal point".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid amount '1.2.3': more than one decimal point");
    }

    #[test]
    fn test_ledger_error_wraps() {
        let err: CliError = LedgerError::ContractPaused.into();
        assert!(err.to_string().starts_with("Ledger rejected the operation"));
    }

    #[test]
    fn test_not_initialized_names_path() {
        let err = CliError::NotInitialized(PathBuf::from("/tmp/ledger"));
        assert!(err.to_string().contains("/tmp/ledger"));
    }
}
