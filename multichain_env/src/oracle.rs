//! Ground-truth ranking boundary.

use crate::error::LedgerError;
use crate::ledger::LedgerReader;
use crate::types::Identity;
use std::collections::BTreeMap;

/// Computes reputation scores from the complete ledger.
///
/// Oracles are consulted once at setup to build the comparison baseline.
/// They never see node-local views and are never consulted by the protocol.
pub trait RankingOracle {
    /// Returns the score of one identity.
    fn score(&self, ledger: &dyn LedgerReader, identity: &Identity) -> Result<f64, LedgerError>;

    /// Returns the score of every identity in the ledger.
    ///
    /// The default calls [`score`](RankingOracle::score) per identity;
    /// oracles that solve for all identities at once should override it.
    fn rank_all(&self, ledger: &dyn LedgerReader) -> Result<BTreeMap<Identity, f64>, LedgerError> {
        ledger
            .list_identities()?
            .into_iter()
            .map(|identity| Ok((identity, self.score(ledger, &identity)?)))
            .collect()
    }
}

/// Scores an identity by its share of the total interaction volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeOracle;

impl RankingOracle for VolumeOracle {
    fn score(&self, ledger: &dyn LedgerReader, identity: &Identity) -> Result<f64, LedgerError> {
        if !ledger.list_identities()?.contains(identity) {
            return Err(LedgerError::unknown(identity));
        }
        let blocks = ledger.all_blocks()?;
        let total: u64 = blocks.iter().map(|b| b.volume()).sum();
        if total == 0 {
            return Ok(0.0);
        }
        let own: u64 = blocks
            .iter()
            .filter(|b| b.public_key == *identity)
            .map(|b| b.volume())
            .sum();
        Ok(own as f64 / total as f64)
    }
}
