//! SimWorld - the discrete-event scheduler.
//!
//! The world owns every node, the event queue, the logical clock and the
//! ground-truth table. Nodes never see each other or the scheduler: each
//! handler returns [`Intent`]s and the world turns them into new events.
//!
//! # Run loop
//!
//! ```text
//! pop earliest event (t, seq)
//!   fire every pending checkpoint c with c < t     (lazy checkpoints)
//!   t > horizon?  -> stop, "Time limit reached"
//!   advance clock to t, dispatch
//! queue empty     -> fire remaining checkpoints, "No more events"
//! final measurement
//! ```
//!
//! A checkpoint at `c` therefore reflects every event with time `<= c` and
//! none with time `> c`.

use crate::context::SimContext;
use crate::error::SimError;
use crate::event::{Event, TraceEntry};
use crate::exporter::{Measurement, MeasurementKind, MeasurementSink, NodeSnapshot};
use crate::network::{SimNetwork, DEFAULT_CONNECTION_DELAY};
use crate::oracle::GroundTruth;
use crate::queue::EventQueue;
use crate::runner::{RunReport, Termination};

use multichain_core::{ordering_agreement, ranking_deviation, Intent, Message, Node, WalkConfig};
use multichain_env::{Block, Identity, LedgerReader, MemoryLedger, RankingOracle};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Default range of the per-node start offset of each periodic action.
pub const DEFAULT_INITIALISATION_DELAY: RangeInclusive<u64> = 0..=5000;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Events later than this are abandoned
    pub horizon: u64,

    /// Spacing of checkpoint measurements
    pub checkpoint_interval: u64,

    /// Log every dispatched event
    pub verbose: bool,

    /// Walk parameters shared by every node
    pub walk: WalkConfig,

    /// Only the first N ledger blocks are loaded
    pub block_limit: Option<usize>,

    /// Delay range of routed messages
    pub connection_delay: RangeInclusive<u64>,

    /// Start offset range of walk steps and ranking updates
    pub initialisation_delay: RangeInclusive<u64>,

    /// Keep a trace of every dispatched event
    pub record_trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            horizon: 100_000,
            checkpoint_interval: 10_000,
            verbose: false,
            walk: WalkConfig::default(),
            block_limit: None,
            connection_delay: DEFAULT_CONNECTION_DELAY,
            initialisation_delay: DEFAULT_INITIALISATION_DELAY,
            record_trace: false,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_horizon(mut self, horizon: u64) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_persistent_walking(mut self, persistent: bool) -> Self {
        self.walk.persistent = persistent;
        self
    }

    pub fn with_directed_walking(mut self, directed: bool) -> Self {
        self.walk.directed = directed;
        self
    }

    pub fn with_teleport_probability(mut self, probability: f64) -> Self {
        self.walk.teleport_probability = probability;
        self
    }

    pub fn with_block_limit(mut self, limit: Option<usize>) -> Self {
        self.block_limit = limit;
        self
    }

    pub fn with_connection_delay(mut self, delay: RangeInclusive<u64>) -> Self {
        self.connection_delay = delay;
        self
    }

    pub fn with_trace(mut self, record: bool) -> Self {
        self.record_trace = record;
        self
    }

    /// Rejects configurations the run cannot honour.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.checkpoint_interval == 0 {
            return Err(SimError::config("checkpoint interval must be positive"));
        }
        if self.connection_delay.is_empty() {
            return Err(SimError::config(format!(
                "empty connection delay range {:?}",
                self.connection_delay
            )));
        }
        if self.initialisation_delay.is_empty() {
            return Err(SimError::config(format!(
                "empty initialisation delay range {:?}",
                self.initialisation_delay
            )));
        }
        self.walk.validate()?;
        Ok(())
    }
}

/// Copies `ledger` into memory, keeping only the first `block_limit` blocks.
pub fn load_ledger(
    ledger: &dyn LedgerReader,
    block_limit: Option<usize>,
) -> Result<MemoryLedger, SimError> {
    let blocks = ledger.all_blocks()?;
    let limit = block_limit.unwrap_or(blocks.len());
    Ok(blocks.into_iter().take(limit).collect())
}

/// The simulation: nodes, queue, clock and ground truth.
pub struct SimWorld {
    config: SimConfig,
    context: SimContext,
    network: SimNetwork,
    queue: EventQueue<Event>,

    /// Every node by identity; the bootstrap sorts first
    nodes: BTreeMap<Identity, Node>,

    ground_truth: GroundTruth,
    trace: Vec<TraceEntry>,
    steps_dispatched: u64,
    checkpoints_emitted: u64,
    finished: bool,
}

impl SimWorld {
    /// Creates a world holding only the bootstrap node.
    pub fn new(config: SimConfig, ground_truth: GroundTruth) -> Result<Self, SimError> {
        config.validate()?;

        let mut nodes = BTreeMap::new();
        nodes.insert(Identity::BOOTSTRAP, Node::bootstrap(config.walk.clone()));

        Ok(Self {
            context: SimContext::new(config.seed),
            network: SimNetwork::new(config.connection_delay.clone()),
            queue: EventQueue::new(),
            nodes,
            ground_truth,
            trace: Vec::new(),
            steps_dispatched: 0,
            checkpoints_emitted: 0,
            finished: false,
            config,
        })
    }

    /// Builds a ready-to-run world: one node per ledger identity, ground
    /// truth from `oracle`, initial events scheduled.
    pub fn from_ledger(
        config: SimConfig,
        ledger: &dyn LedgerReader,
        oracle: &dyn RankingOracle,
    ) -> Result<Self, SimError> {
        info!("Reading multichain ledger");
        let ledger = load_ledger(ledger, config.block_limit)?;

        info!("Calculating rankings");
        let ground_truth = GroundTruth::compute(&ledger, oracle)?;

        Self::populate(config, &ledger, ground_truth)
    }

    /// Like [`SimWorld::from_ledger`] with a precomputed ground truth. The
    /// ledger is used as given; `block_limit` is not applied.
    pub fn from_ledger_with_truth(
        config: SimConfig,
        ledger: &dyn LedgerReader,
        ground_truth: GroundTruth,
    ) -> Result<Self, SimError> {
        Self::populate(config, ledger, ground_truth)
    }

    fn populate(
        config: SimConfig,
        ledger: &dyn LedgerReader,
        ground_truth: GroundTruth,
    ) -> Result<Self, SimError> {
        let mut world = Self::new(config, ground_truth)?;
        let identities = ledger.list_identities()?;
        for identity in &identities {
            world.add_node(*identity, ledger.blocks_for(identity)?)?;
        }

        info!("Scheduling data gathering");
        for identity in &identities {
            world.start_node(*identity)?;
        }
        Ok(world)
    }

    /// Adds a node holding `blocks` and introduces it to the bootstrap.
    pub fn add_node(&mut self, identity: Identity, blocks: Vec<Block>) -> Result<(), SimError> {
        if identity.is_bootstrap() || self.nodes.contains_key(&identity) {
            return Err(SimError::config(format!("duplicate node {}", identity)));
        }

        let mut node = Node::new(identity, self.config.walk.clone());
        node.add_blocks(blocks);

        let bootstrap = self
            .nodes
            .get_mut(&Identity::BOOTSTRAP)
            .ok_or_else(|| SimError::unknown_node(Identity::BOOTSTRAP))?;
        node.introduce(bootstrap);

        debug!("Added node {} with {} blocks", identity, node.block_count());
        self.nodes.insert(identity, node);
        Ok(())
    }

    /// Schedules the first walk step and ranking update of a node, each after
    /// its own initialisation delay.
    pub fn start_node(&mut self, identity: Identity) -> Result<(), SimError> {
        if !self.nodes.contains_key(&identity) {
            return Err(SimError::unknown_node(identity));
        }
        let walk_delay = self.context.uniform(&self.config.initialisation_delay);
        let ranking_delay = self.context.uniform(&self.config.initialisation_delay);
        self.schedule(walk_delay, Event::WalkStep { node: identity })?;
        self.schedule(ranking_delay, Event::RankingUpdate { node: identity })?;
        Ok(())
    }

    /// Enqueues a node timer at `now + delay`. Returns its sequence number.
    ///
    /// Only `WalkStep` and `RankingUpdate` are accepted. Message receipts are
    /// produced by [`SimWorld::route_message`] and measurements by the run loop.
    pub fn schedule(&mut self, delay: u64, event: Event) -> Result<u64, SimError> {
        match event {
            Event::WalkStep { .. } | Event::RankingUpdate { .. } => Ok(self.enqueue(delay, event)),
            other => Err(SimError::Protocol(format!(
                "{} events cannot be scheduled directly",
                other.label()
            ))),
        }
    }

    fn enqueue(&mut self, delay: u64, event: Event) -> u64 {
        let time = self.context.now().saturating_add(delay);
        self.queue.push(time, event)
    }

    /// Schedules delivery of `message` on `target` after a connection delay.
    pub fn route_message(
        &mut self,
        sender: Identity,
        target: Identity,
        message: Message,
    ) -> Result<(), SimError> {
        if !self.nodes.contains_key(&target) {
            return Err(SimError::unknown_node(target));
        }
        let delay = self.network.route(&mut self.context);
        self.enqueue(
            delay,
            Event::MessageReceipt {
                sender,
                target,
                message,
            },
        );
        Ok(())
    }

    /// Runs to the configured horizon.
    pub fn run(&mut self, sink: &mut dyn MeasurementSink) -> Result<RunReport, SimError> {
        self.run_until(self.config.horizon, self.config.checkpoint_interval, sink)
    }

    /// Runs until the queue empties or the next event lies past `horizon`.
    ///
    /// Checkpoints fall on multiples of `checkpoint_interval` below
    /// `horizon`. Exactly one final measurement is emitted either way.
    pub fn run_until(
        &mut self,
        horizon: u64,
        checkpoint_interval: u64,
        sink: &mut dyn MeasurementSink,
    ) -> Result<RunReport, SimError> {
        if self.finished {
            return Err(SimError::Protocol("run already finished".to_string()));
        }
        if checkpoint_interval == 0 {
            return Err(SimError::config("checkpoint interval must be positive"));
        }

        info!(
            "Starting simulation: {} nodes, horizon {}, checkpoint every {}",
            self.nodes.len() - 1,
            horizon,
            checkpoint_interval
        );

        let next_after = |checkpoint: u64| {
            checkpoint
                .checked_add(checkpoint_interval)
                .filter(|t| *t < horizon)
        };
        let mut next_checkpoint = (horizon > 0).then_some(0u64);

        let termination = loop {
            let Some(scheduled) = self.queue.pop() else {
                info!("No more events");
                break Termination::NoMoreEvents;
            };

            while let Some(checkpoint) = next_checkpoint.filter(|c| scheduled.time > *c) {
                self.dispatch(Event::Checkpoint { time: checkpoint }, sink)?;
                next_checkpoint = next_after(checkpoint);
            }

            if scheduled.time > horizon {
                info!("Time limit reached");
                break Termination::TimeLimit;
            }

            self.context.advance_to(scheduled.time);
            self.steps_dispatched += 1;

            if self.config.verbose {
                debug!(
                    "t={} seq={} {} {}",
                    scheduled.time,
                    scheduled.seq,
                    scheduled.event.label(),
                    scheduled
                        .event
                        .node()
                        .map(|n| n.to_string())
                        .unwrap_or_default()
                );
            }
            if self.config.record_trace {
                self.trace.push(TraceEntry {
                    time: scheduled.time,
                    seq: scheduled.seq,
                    label: scheduled.event.label().to_string(),
                    node: scheduled.event.node(),
                });
            }

            self.dispatch(scheduled.event, sink)?;
        };

        if termination == Termination::NoMoreEvents {
            while let Some(checkpoint) = next_checkpoint {
                self.dispatch(Event::Checkpoint { time: checkpoint }, sink)?;
                next_checkpoint = next_after(checkpoint);
            }
        }

        self.dispatch(Event::Final, sink)?;
        self.finished = true;

        let report = self.report(termination);
        info!(
            "Finished at t={} after {} events: {} messages delivered, mean deviation {:.4}",
            report.final_time,
            report.steps_dispatched,
            report.messages_delivered,
            report.mean_final_deviation
        );
        Ok(report)
    }

    fn dispatch(&mut self, event: Event, sink: &mut dyn MeasurementSink) -> Result<(), SimError> {
        match event {
            Event::WalkStep { node } => {
                let handler = self
                    .nodes
                    .get_mut(&node)
                    .ok_or_else(|| SimError::unknown_node(node))?;
                let intents = handler.take_walk_step(self.context.rng_mut());
                self.apply(node, intents)
            }
            Event::RankingUpdate { node } => {
                let handler = self
                    .nodes
                    .get_mut(&node)
                    .ok_or_else(|| SimError::unknown_node(node))?;
                let intents = handler.update_ranking();
                self.apply(node, intents)
            }
            Event::MessageReceipt {
                sender,
                target,
                message,
            } => {
                let handler = self
                    .nodes
                    .get_mut(&target)
                    .ok_or_else(|| SimError::unknown_node(target))?;
                self.network.record_delivery();
                let intents = handler.receive_message(sender, message);
                self.apply(target, intents)
            }
            Event::Checkpoint { time } => {
                let measurement = self.measure(MeasurementKind::Checkpoint, time);
                sink.record(&measurement)?;
                self.checkpoints_emitted += 1;
                if !self.config.verbose {
                    info!(
                        "Checkpoint t={} | blocks={} | mean deviation {:.4}",
                        time,
                        measurement.nodes.iter().map(|n| n.block_count).sum::<usize>(),
                        mean_deviation(&measurement.nodes)
                    );
                }
                Ok(())
            }
            Event::Final => {
                let measurement = self.measure(MeasurementKind::Final, self.context.now());
                sink.record(&measurement)
            }
        }
    }

    /// Turns a handler's intents into scheduled events.
    fn apply(&mut self, node: Identity, intents: Vec<Intent>) -> Result<(), SimError> {
        for intent in intents {
            match intent {
                Intent::Send { target, message } => self.route_message(node, target, message)?,
                Intent::WalkStepAfter(delay) => {
                    self.schedule(delay, Event::WalkStep { node })?;
                }
                Intent::RankingUpdateAfter(delay) => {
                    self.schedule(delay, Event::RankingUpdate { node })?;
                }
            }
        }
        Ok(())
    }

    fn measure(&self, kind: MeasurementKind, time: u64) -> Measurement {
        let with_counters = kind == MeasurementKind::Final;
        Measurement {
            kind,
            time,
            nodes: self
                .nodes()
                .map(|node| self.snapshot(node, with_counters))
                .collect(),
        }
    }

    fn snapshot(&self, node: &Node, with_counters: bool) -> NodeSnapshot {
        let truth = self.ground_truth.scores();
        NodeSnapshot {
            identity: node.identity(),
            block_count: node.block_count(),
            ranking_deviation: ranking_deviation(node.local_ranking(), truth),
            ordering_agreement: ordering_agreement(node.local_ranking(), truth),
            request_counters: with_counters.then(|| node.request_counters().clone()),
        }
    }

    fn report(&self, termination: Termination) -> RunReport {
        let snapshots: Vec<NodeSnapshot> = self.nodes().map(|n| self.snapshot(n, false)).collect();
        RunReport {
            seed: self.config.seed,
            termination,
            final_time: self.context.now(),
            steps_dispatched: self.steps_dispatched,
            messages_sent: self.network.messages_sent(),
            messages_delivered: self.network.messages_delivered(),
            walk_steps: self.nodes().map(|n| n.walk().steps).sum(),
            teleports: self.nodes().map(|n| n.walk().teleports).sum(),
            hops: self.nodes().map(|n| n.walk().hops).sum(),
            checkpoints_emitted: self.checkpoints_emitted,
            mean_final_deviation: mean_deviation(&snapshots),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current logical time.
    pub fn now(&self) -> u64 {
        self.context.now()
    }

    pub fn node(&self, identity: &Identity) -> Option<&Node> {
        self.nodes.get(identity)
    }

    /// Every non-bootstrap node, in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| !n.is_bootstrap())
    }

    pub fn bootstrap(&self) -> Option<&Node> {
        self.nodes.get(&Identity::BOOTSTRAP)
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        &self.ground_truth
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Events scheduled but not yet dispatched.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Dispatched events, if tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn mean_deviation(nodes: &[NodeSnapshot]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    nodes.iter().map(|n| n.ranking_deviation).sum::<f64>() / nodes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::MemorySink;
    use crate::oracle::PageRankOracle;
    use crate::scenarios::{LedgerGenerator, TopologyId};
    use multichain_core::Exchange;

    fn two_node_scenario() -> (SimConfig, MemoryLedger) {
        let config = SimConfig::default()
            .with_seed(7)
            .with_horizon(5000)
            .with_checkpoint_interval(1000)
            .with_teleport_probability(0.1)
            .with_persistent_walking(true)
            .with_directed_walking(true);
        let ledger = LedgerGenerator::new(7, 2).generate(TopologyId::FullMesh);
        (config, ledger)
    }

    fn run(config: SimConfig, ledger: &MemoryLedger) -> (SimWorld, MemorySink, RunReport) {
        let oracle = PageRankOracle::new(config.walk.teleport_probability);
        let mut world = SimWorld::from_ledger(config, ledger, &oracle).unwrap();
        let mut sink = MemorySink::new();
        let report = world.run(&mut sink).unwrap();
        (world, sink, report)
    }

    #[test]
    fn test_config_validation() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(matches!(
            SimConfig::default().with_checkpoint_interval(0).validate(),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            SimConfig::default().with_teleport_probability(2.0).validate(),
            Err(SimError::Walk(_))
        ));
    }

    #[test]
    fn test_two_node_scenario() {
        let (config, ledger) = two_node_scenario();
        let (world, sink, report) = run(config, &ledger);

        let times: Vec<u64> = sink.checkpoints().map(|m| m.time).collect();
        assert_eq!(times, vec![0, 1000, 2000, 3000, 4000]);
        assert_eq!(
            sink.measurements
                .iter()
                .filter(|m| m.kind == MeasurementKind::Final)
                .count(),
            1
        );
        assert_eq!(report.termination, Termination::TimeLimit);
        assert_eq!(report.checkpoints_emitted, 5);
        assert!(world.now() <= 5000);

        let last = sink.final_measurement().unwrap();
        assert_eq!(last.nodes.len(), 2);
        let served: u64 = last.nodes.iter().filter_map(|n| n.requests_served()).sum();
        assert_eq!(served, report.messages_delivered);

        // Counters only appear in the final pass
        assert!(sink
            .checkpoints()
            .all(|m| m.nodes.iter().all(|n| n.request_counters.is_none())));
    }

    #[test]
    fn test_measurement_consistency() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let config = SimConfig::default()
            .with_horizon(8)
            .with_checkpoint_interval(1)
            .with_connection_delay(5..=5);
        let mut world = SimWorld::new(config, GroundTruth::default()).unwrap();
        world.add_node(a, Vec::new()).unwrap();
        world.add_node(b, Vec::new()).unwrap();

        // Delivered at t=5; the reply would land at t=10, past the horizon
        let message = Message::ExchangeRequest(Exchange {
            identities: vec![b],
            blocks: vec![Block::new(b, 1, a, 5, 5)],
        });
        world.route_message(b, a, message).unwrap();

        let mut sink = MemorySink::new();
        let report = world.run(&mut sink).unwrap();
        assert_eq!(report.termination, Termination::TimeLimit);
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.messages_delivered, 1);
        assert_eq!(world.network().in_flight(), 1);

        let blocks_of_a = |time: u64| {
            sink.checkpoints()
                .find(|m| m.time == time)
                .and_then(|m| m.nodes.iter().find(|n| n.identity == a))
                .map(|n| n.block_count)
        };
        assert_eq!(blocks_of_a(4), Some(0));
        assert_eq!(blocks_of_a(5), Some(1));
        assert_eq!(sink.checkpoints().count(), 8);
    }

    #[test]
    fn test_queue_exhaustion_flushes_checkpoints() {
        let config = SimConfig::default().with_horizon(3000).with_checkpoint_interval(1000);
        let mut world = SimWorld::new(config, GroundTruth::default()).unwrap();
        world.add_node(Identity::from_seed(1), Vec::new()).unwrap();

        let mut sink = MemorySink::new();
        let report = world.run(&mut sink).unwrap();

        assert_eq!(report.termination, Termination::NoMoreEvents);
        assert_eq!(sink.checkpoints().count(), 3);
        assert!(sink.final_measurement().is_some());
        assert_eq!(report.steps_dispatched, 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let (config, ledger) = two_node_scenario();
        let config = config.with_trace(true);

        let (first, first_sink, first_report) = run(config.clone(), &ledger);
        let (second, second_sink, second_report) = run(config.clone(), &ledger);

        assert!(!first.trace().is_empty());
        assert_eq!(first.trace(), second.trace());
        assert_eq!(first_sink.measurements, second_sink.measurements);
        assert_eq!(first_report, second_report);

        let (other, _, _) = run(config.with_seed(8), &ledger);
        assert_ne!(first.trace(), other.trace());
    }

    #[test]
    fn test_trace_is_time_ordered() {
        let (config, ledger) = two_node_scenario();
        let (world, _, _) = run(config.with_trace(true), &ledger);

        for pair in world.trace().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.time < b.time || (a.time == b.time && a.seq < b.seq));
        }
    }

    #[test]
    fn test_certain_teleport_sends_nothing() {
        let ledger = LedgerGenerator::new(3, 4).generate(TopologyId::FullMesh);
        let config = SimConfig::default()
            .with_horizon(20_000)
            .with_teleport_probability(1.0);
        let (_, _, report) = run(config, &ledger);

        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.hops, 0);
        assert!(report.walk_steps > 0);
        assert_eq!(report.teleports, report.walk_steps);
    }

    #[test]
    fn test_zero_teleport_never_teleports() {
        let ledger = LedgerGenerator::new(3, 4).generate(TopologyId::FullMesh);
        let config = SimConfig::default()
            .with_horizon(20_000)
            .with_teleport_probability(0.0);
        let (_, _, report) = run(config, &ledger);

        assert_eq!(report.teleports, 0);
        assert!(report.messages_sent > 0);
    }

    #[test]
    fn test_full_mesh_ranking_converges() {
        let ledger = LedgerGenerator::new(11, 3).generate(TopologyId::FullMesh);
        let config = SimConfig::default()
            .with_seed(11)
            .with_horizon(400_000)
            .with_checkpoint_interval(100_000)
            .with_teleport_probability(0.1);
        let (world, sink, _) = run(config, &ledger);

        for truth in world.ground_truth().scores().values() {
            assert!((truth - 1.0 / 3.0).abs() < 1e-6);
        }
        let last = sink.final_measurement().unwrap();
        assert_eq!(last.nodes.len(), 3);
        for node in &last.nodes {
            assert!(
                node.ranking_deviation < 0.15,
                "node {} deviates by {}",
                node.identity,
                node.ranking_deviation
            );
        }
    }

    #[test]
    fn test_block_limit_restricts_ledger() {
        let ledger = LedgerGenerator::new(5, 3).generate(TopologyId::FullMesh);
        let config = SimConfig::default().with_block_limit(Some(2));
        let oracle = PageRankOracle::default();
        let world = SimWorld::from_ledger(config, &ledger, &oracle).unwrap();

        assert_eq!(world.nodes().count(), 2);
        assert_eq!(world.nodes().map(|n| n.block_count()).sum::<usize>(), 2);
        assert_eq!(world.pending_events(), 4);
    }

    #[test]
    fn test_scheduler_rejects_bad_requests() {
        let mut world = SimWorld::new(SimConfig::default(), GroundTruth::default()).unwrap();
        let a = Identity::from_seed(1);

        assert!(matches!(world.schedule(0, Event::Final), Err(SimError::Protocol(_))));
        assert!(matches!(
            world.schedule(0, Event::Checkpoint { time: 0 }),
            Err(SimError::Protocol(_))
        ));
        assert!(matches!(world.start_node(a), Err(SimError::UnknownNode(_))));

        world.add_node(a, Vec::new()).unwrap();
        assert!(world.add_node(a, Vec::new()).is_err());
        assert!(world.add_node(Identity::BOOTSTRAP, Vec::new()).is_err());

        let stray = Message::ExchangeRequest(Exchange {
            identities: Vec::new(),
            blocks: Vec::new(),
        });
        assert!(matches!(
            world.route_message(a, Identity::from_seed(9), stray),
            Err(SimError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_receipts_only_come_from_routing() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let config = SimConfig::default().with_horizon(1000).with_checkpoint_interval(100);
        let mut world = SimWorld::new(config, GroundTruth::default()).unwrap();
        world.add_node(a, Vec::new()).unwrap();
        world.add_node(b, Vec::new()).unwrap();

        let request = Message::ExchangeRequest(Exchange {
            identities: vec![b],
            blocks: Vec::new(),
        });
        let unrouted = Event::MessageReceipt {
            sender: b,
            target: a,
            message: request.clone(),
        };
        assert!(matches!(world.schedule(1, unrouted), Err(SimError::Protocol(_))));
        assert_eq!(world.pending_events(), 0);

        world.route_message(b, a, request).unwrap();
        let report = world.run(&mut MemorySink::new()).unwrap();

        // Request and reply both delivered well before the horizon
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.messages_delivered, 2);
        assert_eq!(world.network().in_flight(), 0);
        assert_eq!(report.checkpoints_emitted, 10);
    }

    #[test]
    fn test_run_only_once() {
        let mut world = SimWorld::new(SimConfig::default(), GroundTruth::default()).unwrap();
        let mut sink = MemorySink::new();
        world.run(&mut sink).unwrap();
        assert!(world.is_finished());
        assert!(world.run(&mut sink).is_err());
    }
}
