//! Experiment runner - executes one ledger over one or more seeds.

use crate::error::SimError;
use crate::exporter::{MeasurementSink, MemorySink};
use crate::oracle::GroundTruth;
use crate::world::{load_ledger, SimConfig, SimWorld};

use multichain_env::{LedgerReader, MemoryLedger, RankingOracle};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The event queue ran dry
    NoMoreEvents,

    /// The next event lay past the horizon
    TimeLimit,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::NoMoreEvents => write!(f, "no more events"),
            Termination::TimeLimit => write!(f, "time limit reached"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Seed used
    pub seed: u64,

    pub termination: Termination,

    /// Logical time of the last dispatched event
    pub final_time: u64,

    /// Node and message events dispatched
    pub steps_dispatched: u64,

    pub messages_sent: u64,
    pub messages_delivered: u64,

    /// Walk steps over all nodes
    pub walk_steps: u64,

    /// Walk steps that teleported
    pub teleports: u64,

    /// Hops completed by a reply
    pub hops: u64,

    pub checkpoints_emitted: u64,

    /// Mean ranking deviation of the final measurement
    pub mean_final_deviation: f64,
}

/// Runs one ledger under a fixed configuration, seed after seed.
///
/// The ledger is read and ranked once; each seed gets a fresh world.
pub struct ExperimentRunner {
    config: SimConfig,
    ledger: MemoryLedger,
    ground_truth: GroundTruth,
}

impl ExperimentRunner {
    /// Loads `ledger` (honouring the block limit) and computes its ground truth.
    pub fn new(
        config: SimConfig,
        ledger: &dyn LedgerReader,
        oracle: &dyn RankingOracle,
    ) -> Result<Self, SimError> {
        config.validate()?;

        info!("Reading multichain ledger");
        let ledger = load_ledger(ledger, config.block_limit)?;

        info!("Calculating rankings");
        let ground_truth = GroundTruth::compute(&ledger, oracle)?;

        Ok(Self {
            config,
            ledger,
            ground_truth,
        })
    }

    /// Runs a single seed, feeding measurements to `sink`.
    pub fn run_seed(
        &self,
        seed: u64,
        sink: &mut dyn MeasurementSink,
    ) -> Result<RunReport, SimError> {
        let config = self.config.clone().with_seed(seed);
        let mut world =
            SimWorld::from_ledger_with_truth(config, &self.ledger, self.ground_truth.clone())?;
        world.run(sink)
    }

    /// Runs `count` consecutive seeds starting at `base_seed`.
    pub fn run_seeds(&self, base_seed: u64, count: usize) -> Result<Vec<RunReport>, SimError> {
        (0..count as u64)
            .map(|offset| {
                let mut sink = MemorySink::new();
                self.run_seed(base_seed.wrapping_add(offset), &mut sink)
            })
            .collect()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        &self.ground_truth
    }
}
