//! Error types for the simulator.

use multichain_core::WalkConfigError;
use multichain_env::LedgerError;
use thiserror::Error;

/// Errors that abort setup or a run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Ledger could not be read at setup
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration rejected before setup
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Walk parameters rejected before setup
    #[error("Invalid walk configuration: {0}")]
    Walk(#[from] WalkConfigError),

    /// An event or message addressed a node that does not exist
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// An event was dispatched in a state that cannot handle it
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Measurement output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON export failed
    #[error("Export error: {0}")]
    Export(String),
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an unknown-node error.
    pub fn unknown_node(node: impl std::fmt::Display) -> Self {
        Self::UnknownNode(node.to_string())
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        Self::Export(e.to_string())
    }
}
