//! Synthetic ledger topologies.

use crate::keys::DeterministicKeyProvider;
use multichain_env::{Block, Identity, MemoryLedger};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Topology identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyId {
    /// Every participant interacted with every other, equal volumes
    FullMesh,

    /// Participant 0 interacted with everyone else, equal volumes
    Star,

    /// Each participant interacted with its successor, equal volumes
    Ring,

    /// Each pair interacted with probability `edge_probability`, random volumes
    Random,
}

impl TopologyId {
    /// Returns a list of all topologies.
    pub fn all() -> Vec<TopologyId> {
        vec![
            TopologyId::FullMesh,
            TopologyId::Star,
            TopologyId::Ring,
            TopologyId::Random,
        ]
    }

    /// Returns the topology name.
    pub fn name(&self) -> &'static str {
        match self {
            TopologyId::FullMesh => "full_mesh",
            TopologyId::Star => "star",
            TopologyId::Ring => "ring",
            TopologyId::Random => "random",
        }
    }

    /// Returns a description of the topology.
    pub fn description(&self) -> &'static str {
        match self {
            TopologyId::FullMesh => "Every pair interacts with equal volume",
            TopologyId::Star => "One hub interacts with every other participant",
            TopologyId::Ring => "Each participant interacts with its successor",
            TopologyId::Random => "Random pairs with random volumes",
        }
    }
}

impl std::fmt::Display for TopologyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TopologyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full_mesh" | "fullmesh" | "mesh" => Ok(TopologyId::FullMesh),
            "star" => Ok(TopologyId::Star),
            "ring" => Ok(TopologyId::Ring),
            "random" => Ok(TopologyId::Random),
            _ => Err(format!("Unknown topology: {}", s)),
        }
    }
}

/// Builds synthetic multichain ledgers.
///
/// Every interaction produces a block pair, one block in each participant's
/// chain. Identities come from [`DeterministicKeyProvider`], so the same
/// seed always yields the same ledger.
#[derive(Debug, Clone)]
pub struct LedgerGenerator {
    /// Seed for identities and random topology choices
    pub seed: u64,

    /// Number of participants
    pub participants: usize,

    /// Interactions per connected pair
    pub rounds: usize,

    /// Volume per direction for equal-volume topologies
    pub unit_volume: u64,

    /// Pair probability for the random topology
    pub edge_probability: f64,
}

impl Default for LedgerGenerator {
    fn default() -> Self {
        Self {
            seed: 42,
            participants: 10,
            rounds: 3,
            unit_volume: 10,
            edge_probability: 0.3,
        }
    }
}

impl LedgerGenerator {
    /// Creates a generator for `participants` identities.
    pub fn new(seed: u64, participants: usize) -> Self {
        Self {
            seed,
            participants,
            ..Default::default()
        }
    }

    /// Sets the number of interactions per connected pair.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Generates the ledger for `topology`.
    pub fn generate(&self, topology: TopologyId) -> MemoryLedger {
        let identities = DeterministicKeyProvider::new(self.seed).identities(self.participants);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x3c6ef372fe94f82b));
        let n = identities.len();

        let pairs: Vec<(usize, usize)> = match topology {
            TopologyId::FullMesh => (0..n)
                .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                .collect(),
            TopologyId::Star => (1..n).map(|j| (0, j)).collect(),
            TopologyId::Ring if n > 2 => (0..n).map(|i| (i, (i + 1) % n)).collect(),
            TopologyId::Ring => (1..n).map(|j| (0, j)).collect(),
            TopologyId::Random => {
                let mut pairs = Vec::new();
                for i in 0..n {
                    for j in (i + 1)..n {
                        if rng.gen_bool(self.edge_probability.clamp(0.0, 1.0)) {
                            pairs.push((i, j));
                        }
                    }
                }
                pairs
            }
        };

        let mut sequence: HashMap<Identity, u64> = HashMap::new();
        let mut next_seq = |id: Identity| {
            let seq = sequence.entry(id).or_insert(0);
            *seq += 1;
            *seq
        };

        let mut ledger = MemoryLedger::new();
        for _ in 0..self.rounds {
            for &(i, j) in &pairs {
                let (a, b) = (identities[i], identities[j]);
                let (up, down) = match topology {
                    TopologyId::Random => (rng.gen_range(1..=100), rng.gen_range(1..=100)),
                    _ => (self.unit_volume, self.unit_volume),
                };
                let seq_a = next_seq(a);
                let seq_b = next_seq(b);
                ledger.insert(Block::new(a, seq_a, b, up, down));
                ledger.insert(Block::new(b, seq_b, a, down, up));
            }
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multichain_env::LedgerReader;

    #[test]
    fn test_topology_parsing() {
        for topology in TopologyId::all() {
            assert_eq!(topology.name().parse::<TopologyId>(), Ok(topology));
        }
        assert!("torus".parse::<TopologyId>().is_err());
    }

    #[test]
    fn test_full_mesh_block_count() {
        let ledger = LedgerGenerator::new(42, 4).with_rounds(2).generate(TopologyId::FullMesh);
        // 6 pairs * 2 rounds * 2 blocks
        assert_eq!(ledger.len(), 24);
        assert_eq!(ledger.list_identities().unwrap().len(), 4);
    }

    #[test]
    fn test_chain_sequence_numbers_are_contiguous() {
        let ledger = LedgerGenerator::new(7, 5).generate(TopologyId::Star);
        for identity in ledger.list_identities().unwrap() {
            let blocks = ledger.blocks_for(&identity).unwrap();
            for (index, block) in blocks.iter().enumerate() {
                assert_eq!(block.sequence_number, index as u64 + 1);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = LedgerGenerator::new(99, 8);
        let a = generator.generate(TopologyId::Random).all_blocks().unwrap();
        let b = generator.generate(TopologyId::Random).all_blocks().unwrap();
        assert_eq!(a, b);
    }
}
