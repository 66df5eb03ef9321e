//! Ledger reader abstraction.

use crate::error::LedgerError;
use crate::types::{Block, BlockId, Identity};
use std::collections::{BTreeSet, HashSet};

/// Read access to a multichain ledger.
///
/// # Implementations
///
/// - **In-memory**: [`MemoryLedger`], used for synthetic topologies and tests
/// - **Persistent**: [`crate::SledLedger`], an embedded key-value store
///
/// Both honour an optional block-count limit: only the first `limit`
/// blocks (in ledger order) are visible to readers.
pub trait LedgerReader {
    /// Returns every identity that authored or was counterparty to a
    /// visible block.
    fn list_identities(&self) -> Result<BTreeSet<Identity>, LedgerError>;

    /// Returns the visible blocks authored by `identity`, ordered by
    /// sequence number.
    ///
    /// # Returns
    /// * `Err(LedgerError::UnknownIdentity)` - identity not in [`list_identities`]
    ///
    /// [`list_identities`]: LedgerReader::list_identities
    fn blocks_for(&self, identity: &Identity) -> Result<Vec<Block>, LedgerError>;

    /// Returns all visible blocks in ledger order.
    fn all_blocks(&self) -> Result<Vec<Block>, LedgerError>;
}

/// Ledger held entirely in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    blocks: Vec<Block>,
    ids: HashSet<BlockId>,
    block_limit: Option<usize>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the visible ledger to its first `limit` blocks.
    pub fn with_block_limit(mut self, limit: Option<usize>) -> Self {
        self.block_limit = limit;
        self
    }

    /// Appends a block. Returns false if a block with the same id exists.
    pub fn insert(&mut self, block: Block) -> bool {
        if !self.ids.insert(block.id()) {
            return false;
        }
        self.blocks.push(block);
        true
    }

    /// Number of stored blocks, ignoring the limit.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn visible(&self) -> &[Block] {
        match self.block_limit {
            Some(limit) => &self.blocks[..limit.min(self.blocks.len())],
            None => &self.blocks,
        }
    }
}

impl FromIterator<Block> for MemoryLedger {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        let mut ledger = MemoryLedger::new();
        for block in iter {
            ledger.insert(block);
        }
        ledger
    }
}

impl LedgerReader for MemoryLedger {
    fn list_identities(&self) -> Result<BTreeSet<Identity>, LedgerError> {
        Ok(identities_of(self.visible()))
    }

    fn blocks_for(&self, identity: &Identity) -> Result<Vec<Block>, LedgerError> {
        let visible = self.visible();
        if !identities_of(visible).contains(identity) {
            return Err(LedgerError::unknown(identity));
        }
        let mut blocks: Vec<Block> = visible
            .iter()
            .filter(|b| b.public_key == *identity)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.sequence_number);
        Ok(blocks)
    }

    fn all_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.visible().to_vec())
    }
}

/// Collects authors and counterparties of `blocks`.
pub(crate) fn identities_of(blocks: &[Block]) -> BTreeSet<Identity> {
    blocks
        .iter()
        .flat_map(|b| [b.public_key, b.link_public_key])
        .filter(|id| !id.is_bootstrap())
        .collect()
}
