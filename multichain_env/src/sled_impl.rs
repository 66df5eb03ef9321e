//! Persistent ledger backed by an embedded sled database.

use crate::error::LedgerError;
use crate::ledger::{identities_of, LedgerReader};
use crate::types::{Block, Identity};
use std::collections::BTreeSet;
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";
const INDEX_TREE: &str = "block_ids";

/// Sled-based multichain ledger.
///
/// Blocks are stored under their global insertion index (big endian), so
/// iterating the `blocks` tree yields ledger order. A second tree maps
/// `author ‖ sequence_number` to the index for duplicate detection.
pub struct SledLedger {
    db: sled::Db,
    blocks: sled::Tree,
    index: sled::Tree,
    block_limit: Option<usize>,
}

impl SledLedger {
    /// Opens an existing ledger. Fails if `path` does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LedgerError::NotFound(path.display().to_string()));
        }
        Self::create(path)
    }

    /// Opens a ledger, creating it if missing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(path)
            .map_err(|e| LedgerError::storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Creates a throwaway ledger that is deleted on drop.
    pub fn temporary() -> Result<Self, LedgerError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| LedgerError::storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, LedgerError> {
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| LedgerError::storage(format!("Failed to open tree: {}", e)))?;
        let index = db
            .open_tree(INDEX_TREE)
            .map_err(|e| LedgerError::storage(format!("Failed to open tree: {}", e)))?;
        Ok(Self {
            db,
            blocks,
            index,
            block_limit: None,
        })
    }

    /// Limits the visible ledger to its first `limit` blocks.
    pub fn with_block_limit(mut self, limit: Option<usize>) -> Self {
        self.block_limit = limit;
        self
    }

    /// Appends a block. Returns false if a block with the same id exists.
    pub fn insert(&self, block: &Block) -> Result<bool, LedgerError> {
        let id_key = block_key(block);
        if self
            .index
            .contains_key(id_key)
            .map_err(|e| LedgerError::storage(format!("Lookup failed: {}", e)))?
        {
            return Ok(false);
        }

        let position = self.blocks.len() as u64;
        let value = serde_json::to_vec(block)
            .map_err(|e| LedgerError::CorruptRecord(e.to_string()))?;
        self.blocks
            .insert(position.to_be_bytes(), value)
            .map_err(|e| LedgerError::storage(format!("Insert failed: {}", e)))?;
        self.index
            .insert(id_key, &position.to_be_bytes()[..])
            .map_err(|e| LedgerError::storage(format!("Insert failed: {}", e)))?;
        Ok(true)
    }

    /// Copies every visible block of another ledger into this one.
    pub fn import(&self, source: &dyn LedgerReader) -> Result<usize, LedgerError> {
        let mut inserted = 0;
        for block in source.all_blocks()? {
            if self.insert(&block)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db
            .flush()
            .map_err(|e| LedgerError::storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn visible(&self) -> Result<Vec<Block>, LedgerError> {
        let limit = self.block_limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for result in self.blocks.iter().take(limit) {
            let (_, value) = result
                .map_err(|e| LedgerError::storage(format!("Iteration failed: {}", e)))?;
            let block: Block = serde_json::from_slice(&value)
                .map_err(|e| LedgerError::CorruptRecord(e.to_string()))?;
            out.push(block);
        }
        Ok(out)
    }
}

fn block_key(block: &Block) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(block.public_key.as_bytes());
    key[32..].copy_from_slice(&block.sequence_number.to_be_bytes());
    key
}

impl LedgerReader for SledLedger {
    fn list_identities(&self) -> Result<BTreeSet<Identity>, LedgerError> {
        Ok(identities_of(&self.visible()?))
    }

    fn blocks_for(&self, identity: &Identity) -> Result<Vec<Block>, LedgerError> {
        let visible = self.visible()?;
        if !identities_of(&visible).contains(identity) {
            return Err(LedgerError::unknown(identity));
        }
        let mut blocks: Vec<Block> = visible
            .into_iter()
            .filter(|b| b.public_key == *identity)
            .collect();
        blocks.sort_by_key(|b| b.sequence_number);
        Ok(blocks)
    }

    fn all_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        self.visible()
    }
}
