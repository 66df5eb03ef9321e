//! Multichain Deterministic Simulation Harness
//!
//! Runs the random-walk reputation protocol of [`multichain_core`] over a
//! multichain ledger inside a single-threaded discrete-event simulation.
//! One seed fixes every source of randomness, so a run is reproducible
//! event for event.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ EventQueue (time, seq)  +  SimContext (clock, RNG)   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │ Event                  │ Event                      │
//! │  ┌────▼────┐   Intents    ┌────▼────┐                       │
//! │  │  Node   │─────────────►│  Node   │     ...               │
//! │  │   #1    │  SimNetwork  │   #2    │                       │
//! │  └─────────┘   (delays)   └─────────┘                       │
//! │                                                             │
//! │  GroundTruth (PageRank over the full ledger)                │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  MeasurementSink (checkpoints + final)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use multichain_sim::{MemorySink, PageRankOracle, SimConfig, SimWorld};
//! use multichain_sim::scenarios::{LedgerGenerator, TopologyId};
//!
//! let ledger = LedgerGenerator::new(42, 10).generate(TopologyId::Random);
//! let config = SimConfig::default().with_horizon(50_000);
//! let oracle = PageRankOracle::new(config.walk.teleport_probability);
//!
//! let mut world = SimWorld::from_ledger(config, &ledger, &oracle)?;
//! let report = world.run(&mut MemorySink::new())?;
//! ```

mod context;
mod error;
mod event;
mod exporter;
mod keys;
mod network;
mod oracle;
mod queue;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use event::{Event, TraceEntry};
pub use exporter::{
    FileSink, Measurement, MeasurementKind, MeasurementSink, MemorySink, NodeSnapshot, SimExport,
};
pub use keys::DeterministicKeyProvider;
pub use network::{SimNetwork, DEFAULT_CONNECTION_DELAY};
pub use oracle::{GroundTruth, PageRankOracle};
pub use queue::{EventQueue, Scheduled};
pub use runner::{ExperimentRunner, RunReport, Termination};
pub use world::{load_ledger, SimConfig, SimWorld, DEFAULT_INITIALISATION_DELAY};
