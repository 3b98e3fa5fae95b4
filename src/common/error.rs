//! Error types for the conformance harness
//!
//! These cover failures of the harness itself (bad configuration, unreadable
//! scripts, I/O). Anything the device does wrong is recorded as an
//! [`Outcome`](crate::ledger::Outcome) instead and never surfaces here.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the conformance harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid device address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    // === HTTP Client Errors ===
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // === Script Errors ===
    #[error("Invalid scenario script: {0}")]
    Script(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(address: &str, reason: &str) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}
