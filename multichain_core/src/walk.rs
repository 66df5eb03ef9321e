//! Random-walk policy: configuration, walker state and hop selection.
//!
//! A walk is a sequence of hops across known identities. Before every hop
//! the walker may teleport back to its origin, which bounds walk length and
//! keeps the walk ergodic over a connected component. Two independent axes
//! shape hop selection:
//!
//! - **Persistence**: continue from the current position, or sample every
//!   hop independently from the origin
//! - **Directedness**: uniform over candidates, or weighted toward peers
//!   the local ranking already trusts

use multichain_env::Identity;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Invalid walk configuration.
#[derive(Debug, Error, PartialEq)]
pub enum WalkConfigError {
    #[error("Teleport probability {0} outside [0, 1]")]
    TeleportOutOfRange(f64),

    #[error("{0} must be positive")]
    ZeroInterval(&'static str),
}

/// Walk and ranking parameters shared by every node of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Continue from the walker's position instead of restarting at the origin
    pub persistent: bool,

    /// Weight hop selection by current local ranking
    pub directed: bool,

    /// Probability of resetting to the origin before a hop
    pub teleport_probability: f64,

    /// Delay before the next walk step after a completed hop or teleport
    pub walk_interval: u64,

    /// Delay between two ranking updates
    pub ranking_interval: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            directed: false,
            teleport_probability: 0.1,
            walk_interval: 100,
            ranking_interval: 1000,
        }
    }
}

impl WalkConfig {
    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), WalkConfigError> {
        if !(0.0..=1.0).contains(&self.teleport_probability) {
            return Err(WalkConfigError::TeleportOutOfRange(self.teleport_probability));
        }
        if self.walk_interval == 0 {
            return Err(WalkConfigError::ZeroInterval("walk_interval"));
        }
        if self.ranking_interval == 0 {
            return Err(WalkConfigError::ZeroInterval("ranking_interval"));
        }
        Ok(())
    }
}

/// Position and counters of one node's walker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkState {
    /// Node the walk restarts from
    pub origin: Identity,

    /// Identity the walker currently stands on
    pub position: Identity,

    /// Peer whose reply would complete the current hop
    pub in_flight: Option<Identity>,

    /// Walk steps taken (hops, teleports and idle steps)
    pub steps: u64,

    /// Steps that teleported back to the origin
    pub teleports: u64,

    /// Steps that found no viable hop target
    pub idle_steps: u64,

    /// Hops completed by a reply
    pub hops: u64,
}

impl WalkState {
    /// Creates a walker standing on its origin.
    pub fn new(origin: Identity) -> Self {
        Self {
            origin,
            position: origin,
            in_flight: None,
            steps: 0,
            teleports: 0,
            idle_steps: 0,
            hops: 0,
        }
    }

    /// Moves the walker back to its origin.
    pub fn reset(&mut self) {
        self.position = self.origin;
    }

    /// Identity the next hop is taken from.
    pub fn hop_origin(&self, persistent: bool) -> Identity {
        if persistent {
            self.position
        } else {
            self.origin
        }
    }
}

/// Picks the next hop among `candidates`.
///
/// Undirected selection is uniform. Directed selection weights every
/// candidate by `score + 1 / n`, so unranked peers stay reachable and equal
/// scores tie uniformly. Returns `None` when there is no candidate.
pub fn choose_hop<R: Rng + ?Sized>(
    candidates: &[Identity],
    ranking: &BTreeMap<Identity, f64>,
    directed: bool,
    rng: &mut R,
) -> Option<Identity> {
    if candidates.is_empty() {
        return None;
    }
    if !directed {
        return candidates.choose(rng).copied();
    }

    let floor = 1.0 / candidates.len() as f64;
    let weights: Vec<f64> = candidates
        .iter()
        .map(|id| ranking.get(id).copied().unwrap_or(0.0).max(0.0) + floor)
        .collect();

    match WeightedIndex::new(&weights) {
        Ok(dist) => Some(candidates[dist.sample(rng)]),
        Err(_) => candidates.choose(rng).copied(),
    }
}
