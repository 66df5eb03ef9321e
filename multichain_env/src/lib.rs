//! Multichain Ledger Boundary
//!
//! This crate holds everything the simulator consumes from "outside" the
//! protocol: participant identities, ledger blocks, the ledger reader used
//! at setup, and the ground-truth ranking oracle.
//!
//! # Readers
//!
//! - **In-memory**: [`MemoryLedger`], built from synthetic topologies
//! - **Persistent**: [`SledLedger`], an embedded sled database
//!
//! Readers are only consulted during setup. A failure to read the ledger
//! is fatal: the simulation cannot run without its population.
//!
//! # Example
//!
//! ```ignore
//! use multichain_env::{LedgerReader, MemoryLedger, RankingOracle, VolumeOracle};
//!
//! let ledger = MemoryLedger::new().with_block_limit(Some(10_000));
//! for identity in ledger.list_identities()? {
//!     let history = ledger.blocks_for(&identity)?;
//!     let score = VolumeOracle.score(&ledger, &identity)?;
//! }
//! ```

mod error;
mod ledger;
mod oracle;
mod sled_impl;
mod types;

pub use error::LedgerError;
pub use ledger::{LedgerReader, MemoryLedger};
pub use oracle::{RankingOracle, VolumeOracle};
pub use sled_impl::SledLedger;
pub use types::{Block, BlockId, Identity};
