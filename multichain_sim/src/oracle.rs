//! Ground truth oracle for simulation.
//!
//! The oracle has the "God's eye view" of the ledger: it ranks every
//! identity over the complete block graph, once, at setup. Nodes never see
//! the result; it exists only to score their local estimates.

use multichain_env::{Identity, LedgerError, LedgerReader, RankingOracle};
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Random-surfer PageRank over the complete interaction graph.
///
/// Each block adds an edge from its author to its counterparty weighted by
/// the interaction volume (at least one unit). Identities without outgoing
/// edges spread their mass uniformly.
#[derive(Debug, Clone)]
pub struct PageRankOracle {
    /// Probability of restarting at a uniformly random identity
    restart_probability: f64,

    /// L1 change below which iteration stops
    tolerance: f64,

    /// Iteration cap
    max_iterations: usize,
}

impl PageRankOracle {
    /// Creates an oracle with the given restart probability.
    pub fn new(restart_probability: f64) -> Self {
        Self {
            restart_probability: restart_probability.clamp(0.0, 1.0),
            tolerance: 1e-10,
            max_iterations: 1000,
        }
    }

    /// Sets the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn solve(&self, ledger: &dyn LedgerReader) -> Result<BTreeMap<Identity, f64>, LedgerError> {
        let identities: Vec<Identity> = ledger.list_identities()?.into_iter().collect();
        let n = identities.len();
        if n == 0 {
            return Ok(BTreeMap::new());
        }
        let position: HashMap<Identity, usize> = identities
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        // transition[(to, from)]
        let mut transition = DMatrix::<f64>::zeros(n, n);
        for block in ledger.all_blocks()? {
            if let (Some(&from), Some(&to)) = (
                position.get(&block.public_key),
                position.get(&block.link_public_key),
            ) {
                transition[(to, from)] += block.volume().max(1) as f64;
            }
        }

        let mut dangling = vec![false; n];
        for (from, is_dangling) in dangling.iter_mut().enumerate() {
            let mut column = transition.column_mut(from);
            let total = column.sum();
            if total > 0.0 {
                column /= total;
            } else {
                *is_dangling = true;
            }
        }

        let uniform = 1.0 / n as f64;
        let follow = 1.0 - self.restart_probability;
        let mut rank = DVector::<f64>::from_element(n, uniform);

        for iteration in 0..self.max_iterations {
            let dangling_mass: f64 = dangling
                .iter()
                .zip(rank.iter())
                .filter(|(d, _)| **d)
                .map(|(_, r)| r)
                .sum();

            let spread = &transition * &rank;
            let next = spread.map(|v| follow * (v + dangling_mass * uniform) + self.restart_probability * uniform);
            let change = (&next - &rank).abs().sum();
            rank = next;

            if change < self.tolerance {
                debug!("PageRank converged after {} iterations", iteration + 1);
                break;
            }
        }

        Ok(identities
            .into_iter()
            .zip(rank.iter().copied())
            .collect())
    }
}

impl Default for PageRankOracle {
    fn default() -> Self {
        Self::new(0.15)
    }
}

impl RankingOracle for PageRankOracle {
    fn score(&self, ledger: &dyn LedgerReader, identity: &Identity) -> Result<f64, LedgerError> {
        self.solve(ledger)?
            .get(identity)
            .copied()
            .ok_or_else(|| LedgerError::unknown(identity))
    }

    fn rank_all(&self, ledger: &dyn LedgerReader) -> Result<BTreeMap<Identity, f64>, LedgerError> {
        self.solve(ledger)
    }
}

/// Immutable ground-truth ranking table, computed once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    scores: BTreeMap<Identity, f64>,
}

impl GroundTruth {
    /// Ranks every identity of the ledger with `oracle`.
    pub fn compute(ledger: &dyn LedgerReader, oracle: &dyn RankingOracle) -> Result<Self, LedgerError> {
        Ok(Self {
            scores: oracle.rank_all(ledger)?,
        })
    }

    /// Wraps a precomputed table.
    pub fn from_scores(scores: BTreeMap<Identity, f64>) -> Self {
        Self { scores }
    }

    /// Score of one identity.
    pub fn score(&self, identity: &Identity) -> Option<f64> {
        self.scores.get(identity).copied()
    }

    /// The full table.
    pub fn scores(&self) -> &BTreeMap<Identity, f64> {
        &self.scores
    }

    /// Number of ranked identities.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true if nothing is ranked.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use multichain_env::{Block, MemoryLedger, VolumeOracle};

    fn interaction(ledger: &mut MemoryLedger, a: Identity, seq_a: u64, b: Identity, seq_b: u64, volume: u64) {
        ledger.insert(Block::new(a, seq_a, b, volume, volume));
        ledger.insert(Block::new(b, seq_b, a, volume, volume));
    }

    #[test]
    fn test_symmetric_triangle_is_uniform() {
        let [a, b, c] = [1, 2, 3].map(Identity::from_seed);
        let mut ledger = MemoryLedger::new();
        interaction(&mut ledger, a, 1, b, 1, 10);
        interaction(&mut ledger, b, 2, c, 1, 10);
        interaction(&mut ledger, c, 2, a, 2, 10);

        let truth = GroundTruth::compute(&ledger, &PageRankOracle::default()).unwrap();
        assert_eq!(truth.len(), 3);
        for id in [a, b, c] {
            assert_relative_eq!(truth.score(&id).unwrap(), 1.0 / 3.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_star_center_ranks_highest() {
        let center = Identity::from_seed(0);
        let mut ledger = MemoryLedger::new();
        for leaf in 1..=4u64 {
            interaction(&mut ledger, center, leaf, Identity::from_seed(leaf), 1, 5);
        }

        let truth = GroundTruth::compute(&ledger, &PageRankOracle::default()).unwrap();
        let total: f64 = truth.scores().values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-8);

        let center_score = truth.score(&center).unwrap();
        for leaf in 1..=4u64 {
            assert!(center_score > truth.score(&Identity::from_seed(leaf)).unwrap());
        }
    }

    #[test]
    fn test_score_matches_rank_all() {
        let [a, b] = [1, 2].map(Identity::from_seed);
        let mut ledger = MemoryLedger::new();
        interaction(&mut ledger, a, 1, b, 1, 3);

        let oracle = PageRankOracle::new(0.2);
        let table = oracle.rank_all(&ledger).unwrap();
        assert_relative_eq!(oracle.score(&ledger, &a).unwrap(), table[&a]);
        assert!(oracle.score(&ledger, &Identity::from_seed(9)).is_err());
    }

    #[test]
    fn test_ground_truth_with_other_oracle() {
        let [a, b] = [1, 2].map(Identity::from_seed);
        let mut ledger = MemoryLedger::new();
        interaction(&mut ledger, a, 1, b, 1, 3);

        let truth = GroundTruth::compute(&ledger, &VolumeOracle).unwrap();
        assert_relative_eq!(truth.score(&a).unwrap(), 0.5);
    }
}
