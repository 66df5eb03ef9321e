//! Node - the per-participant protocol state machine.
//!
//! A node never touches another node or the scheduler. Each handler
//! mutates only the node's own state and returns a fresh list of
//! [`Intent`]s that the scheduler interprets: messages to route, and
//! follow-up walk steps or ranking updates to schedule.
//!
//! # Message Flow
//!
//! ```text
//! Walker A                  Scheduler                  Peer B
//!   |-- take_walk_step ------->|                          |
//!   |   Send(B, Request)       |-- [connection delay] --->|
//!   |                          |                          |-- receive_message
//!   |                          |<------ Send(A, Reply) ---|
//!   |<-- [connection delay] ---|                          |
//!   |-- receive_message        |                          |
//!   |   visit(B), WalkStepAfter(walk_interval)            |
//! ```

use crate::ranking::visit_ranking;
use crate::walk::{choose_hop, WalkConfig, WalkState};
use multichain_env::{Block, BlockId, Identity};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Payload of an information exchange: what the sender offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Identities known to the sender, the sender included
    pub identities: Vec<Identity>,

    /// Blocks known to the sender
    pub blocks: Vec<Block>,
}

/// Messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Sent by a walker to the peer it hops to
    ExchangeRequest(Exchange),

    /// Sent back by the peer; completes the walker's hop
    ExchangeReply(Exchange),
}

impl Message {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ExchangeRequest(_) => "request",
            Message::ExchangeReply(_) => "reply",
        }
    }
}

/// Effects a handler asks the scheduler to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Route a message to `target` (the scheduler adds network delay)
    Send { target: Identity, message: Message },

    /// Run `take_walk_step` on this node after `delay`
    WalkStepAfter(u64),

    /// Run `update_ranking` on this node after `delay`
    RankingUpdateAfter(u64),
}

/// One simulated multichain participant.
#[derive(Debug, Clone)]
pub struct Node {
    identity: Identity,
    config: WalkConfig,

    /// Blocks received so far, in arrival order
    known_blocks: Vec<Block>,
    block_ids: HashSet<BlockId>,

    /// Interaction graph derived from `known_blocks`
    adjacency: BTreeMap<Identity, BTreeSet<Identity>>,

    /// Peers discovered through identity exchange
    known_identities: BTreeSet<Identity>,

    walk: WalkState,
    visits: BTreeMap<Identity, u64>,
    local_ranking: BTreeMap<Identity, f64>,

    /// Inbound messages served, per sender
    request_counters: BTreeMap<Identity, u64>,
}

impl Node {
    /// Creates a node with an empty local view.
    pub fn new(identity: Identity, config: WalkConfig) -> Self {
        Self {
            identity,
            config,
            known_blocks: Vec::new(),
            block_ids: HashSet::new(),
            adjacency: BTreeMap::new(),
            known_identities: BTreeSet::new(),
            walk: WalkState::new(identity),
            visits: BTreeMap::new(),
            local_ranking: BTreeMap::new(),
            request_counters: BTreeMap::new(),
        }
    }

    /// Creates the bootstrap node.
    pub fn bootstrap(config: WalkConfig) -> Self {
        Self::new(Identity::BOOTSTRAP, config)
    }

    /// Returns true for the bootstrap node.
    pub fn is_bootstrap(&self) -> bool {
        self.identity.is_bootstrap()
    }

    /// Appends blocks not seen before. Returns the number added.
    pub fn add_blocks(&mut self, blocks: impl IntoIterator<Item = Block>) -> usize {
        let mut added = 0;
        for block in blocks {
            if !self.block_ids.insert(block.id()) {
                continue;
            }
            let (a, b) = (block.public_key, block.link_public_key);
            self.adjacency.entry(a).or_default().insert(b);
            self.adjacency.entry(b).or_default().insert(a);
            self.known_blocks.push(block);
            added += 1;
        }
        added
    }

    /// Learns a peer identity. Returns false if it was already known or is
    /// this node's own identity.
    pub fn receive_identity(&mut self, identity: Identity) -> bool {
        identity != self.identity && self.known_identities.insert(identity)
    }

    /// Mutual identity exchange with the bootstrap node at setup.
    ///
    /// The node learns the bootstrap and every identity the bootstrap has
    /// been introduced to so far; the bootstrap learns the node.
    pub fn introduce(&mut self, bootstrap: &mut Node) {
        self.receive_identity(bootstrap.identity);
        for peer in bootstrap.known_identities.iter() {
            self.receive_identity(*peer);
        }
        bootstrap.receive_identity(self.identity);
    }

    /// Takes one walk step.
    ///
    /// With probability `teleport_probability` the walker resets to the
    /// origin without touching the network. Otherwise it sends an exchange
    /// request to a hop target; the next step is scheduled when the reply
    /// arrives. Without any viable target the step degenerates into a
    /// reset plus reschedule.
    pub fn take_walk_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Intent> {
        self.walk.steps += 1;

        if rng.gen_bool(self.config.teleport_probability) {
            self.walk.teleports += 1;
            self.walk.reset();
            return vec![Intent::WalkStepAfter(self.config.walk_interval)];
        }

        let candidates = self.hop_candidates();
        match choose_hop(&candidates, &self.local_ranking, self.config.directed, rng) {
            Some(target) => {
                self.walk.in_flight = Some(target);
                vec![Intent::Send {
                    target,
                    message: Message::ExchangeRequest(self.offer()),
                }]
            }
            None => {
                self.walk.idle_steps += 1;
                self.walk.reset();
                vec![Intent::WalkStepAfter(self.config.walk_interval)]
            }
        }
    }

    /// Recomputes the local ranking from walk visits and reschedules itself.
    pub fn update_ranking(&mut self) -> Vec<Intent> {
        let peers: Vec<Identity> = self.walkable_peers().collect();
        self.local_ranking = visit_ranking(&self.visits, &peers);
        vec![Intent::RankingUpdateAfter(self.config.ranking_interval)]
    }

    /// Handles an inbound message from `sender`.
    pub fn receive_message(&mut self, sender: Identity, message: Message) -> Vec<Intent> {
        *self.request_counters.entry(sender).or_insert(0) += 1;
        self.receive_identity(sender);

        match message {
            Message::ExchangeRequest(exchange) => {
                self.merge(exchange);
                vec![Intent::Send {
                    target: sender,
                    message: Message::ExchangeReply(self.offer()),
                }]
            }
            Message::ExchangeReply(exchange) => {
                self.merge(exchange);
                if self.walk.in_flight != Some(sender) {
                    // Stale reply; the walk chain continues elsewhere
                    return Vec::new();
                }
                self.walk.in_flight = None;
                self.walk.hops += 1;
                self.walk.position = sender;
                *self.visits.entry(sender).or_insert(0) += 1;
                vec![Intent::WalkStepAfter(self.config.walk_interval)]
            }
        }
    }

    /// What this node offers in an exchange.
    fn offer(&self) -> Exchange {
        let mut identities = Vec::with_capacity(self.known_identities.len() + 1);
        identities.push(self.identity);
        identities.extend(self.known_identities.iter().copied());
        Exchange {
            identities,
            blocks: self.known_blocks.clone(),
        }
    }

    fn merge(&mut self, exchange: Exchange) {
        for identity in exchange.identities {
            self.receive_identity(identity);
        }
        self.add_blocks(exchange.blocks);
    }

    /// Known peers that can be walked to: neither self nor the bootstrap.
    fn walkable_peers(&self) -> impl Iterator<Item = Identity> + '_ {
        self.known_identities
            .iter()
            .copied()
            .filter(|id| !id.is_bootstrap() && *id != self.identity)
    }

    /// Peers adjacent to the hop origin in the local block graph, falling
    /// back to every walkable peer.
    fn hop_candidates(&self) -> Vec<Identity> {
        let from = self.walk.hop_origin(self.config.persistent);
        let adjacent: Vec<Identity> = match self.adjacency.get(&from) {
            Some(neighbours) => self
                .walkable_peers()
                .filter(|id| neighbours.contains(id))
                .collect(),
            None => Vec::new(),
        };
        if adjacent.is_empty() {
            self.walkable_peers().collect()
        } else {
            adjacent
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub fn known_blocks(&self) -> &[Block] {
        &self.known_blocks
    }

    pub fn block_count(&self) -> usize {
        self.known_blocks.len()
    }

    pub fn known_identities(&self) -> &BTreeSet<Identity> {
        &self.known_identities
    }

    pub fn walk(&self) -> &WalkState {
        &self.walk
    }

    pub fn visits(&self) -> &BTreeMap<Identity, u64> {
        &self.visits
    }

    pub fn local_ranking(&self) -> &BTreeMap<Identity, f64> {
        &self.local_ranking
    }

    pub fn request_counters(&self) -> &BTreeMap<Identity, u64> {
        &self.request_counters
    }

    /// Total inbound messages served.
    pub fn requests_served(&self) -> u64 {
        self.request_counters.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config(teleport_probability: f64) -> WalkConfig {
        WalkConfig {
            teleport_probability,
            ..Default::default()
        }
    }

    fn block(a: Identity, seq: u64, b: Identity) -> Block {
        Block::new(a, seq, b, 1, 1)
    }

    #[test]
    fn test_introduce_is_mutual() {
        let mut bootstrap = Node::bootstrap(config(0.1));
        let mut first = Node::new(Identity::from_seed(1), config(0.1));
        let mut second = Node::new(Identity::from_seed(2), config(0.1));

        first.introduce(&mut bootstrap);
        second.introduce(&mut bootstrap);

        assert!(first.known_identities().contains(&Identity::BOOTSTRAP));
        assert!(!first.known_identities().contains(&second.identity()));
        assert!(second.known_identities().contains(&first.identity()));
        assert_eq!(bootstrap.known_identities().len(), 2);
    }

    #[test]
    fn test_lonely_node_idles() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bootstrap = Node::bootstrap(config(0.0));
        let mut node = Node::new(Identity::from_seed(1), config(0.0));
        node.introduce(&mut bootstrap);

        let intents = node.take_walk_step(&mut rng);
        assert_eq!(intents, vec![Intent::WalkStepAfter(100)]);
        assert_eq!(node.walk().idle_steps, 1);
        assert_eq!(node.walk().teleports, 0);
    }

    #[test]
    fn test_full_teleport_never_sends() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut node = Node::new(Identity::from_seed(1), config(1.0));
        node.receive_identity(Identity::from_seed(2));

        for _ in 0..100 {
            let intents = node.take_walk_step(&mut rng);
            assert!(intents.iter().all(|i| !matches!(i, Intent::Send { .. })));
        }
        assert_eq!(node.walk().teleports, 100);
    }

    #[test]
    fn test_zero_teleport_always_hops() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let peer = Identity::from_seed(2);
        let mut node = Node::new(Identity::from_seed(1), config(0.0));
        node.receive_identity(peer);

        for _ in 0..50 {
            let intents = node.take_walk_step(&mut rng);
            assert!(matches!(&intents[..], [Intent::Send { target, .. }] if *target == peer));
        }
        assert_eq!(node.walk().teleports, 0);
    }

    #[test]
    fn test_request_reply_round_trip() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let c = Identity::from_seed(3);

        let mut walker = Node::new(a, config(0.0));
        walker.add_blocks([block(a, 1, b)]);
        walker.receive_identity(b);

        let mut peer = Node::new(b, config(0.0));
        peer.add_blocks([block(b, 1, a), block(b, 2, c)]);
        peer.receive_identity(c);

        let request = match walker.take_walk_step(&mut rng).pop() {
            Some(Intent::Send { target, message }) => {
                assert_eq!(target, b);
                message
            }
            other => panic!("expected a send, got {:?}", other),
        };

        let reply = match peer.receive_message(a, request).pop() {
            Some(Intent::Send { target, message }) => {
                assert_eq!(target, a);
                assert_eq!(message.kind(), "reply");
                message
            }
            other => panic!("expected a reply, got {:?}", other),
        };
        assert!(peer.known_identities().contains(&a));
        assert_eq!(peer.block_count(), 3);
        assert_eq!(peer.request_counters()[&a], 1);

        let next = walker.receive_message(b, reply);
        assert_eq!(next, vec![Intent::WalkStepAfter(100)]);
        assert_eq!(walker.walk().position, b);
        assert_eq!(walker.walk().hops, 1);
        assert_eq!(walker.visits()[&b], 1);
        assert!(walker.known_identities().contains(&c));
        assert_eq!(walker.block_count(), 3);
    }

    #[test]
    fn test_stale_reply_does_not_fork_walk() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let mut walker = Node::new(a, config(0.0));

        let reply = Message::ExchangeReply(Exchange {
            identities: vec![b],
            blocks: Vec::new(),
        });
        assert!(walker.receive_message(b, reply).is_empty());
        assert_eq!(walker.requests_served(), 1);
        assert!(walker.visits().is_empty());
    }

    #[test]
    fn test_persistent_walk_follows_block_graph() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let c = Identity::from_seed(3);
        let d = Identity::from_seed(4);

        let persistent = WalkConfig {
            persistent: true,
            teleport_probability: 0.0,
            ..Default::default()
        };
        let mut walker = Node::new(a, persistent);
        walker.add_blocks([block(a, 1, b), block(b, 1, c)]);
        for peer in [b, c, d] {
            walker.receive_identity(peer);
        }

        // Pretend a hop to b completed
        walker.walk.position = b;
        for _ in 0..20 {
            match walker.take_walk_step(&mut rng).pop() {
                Some(Intent::Send { target, .. }) => assert_eq!(target, c),
                other => panic!("expected a send, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_update_ranking_uses_visits() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let c = Identity::from_seed(3);
        let mut node = Node::new(a, config(0.0));
        node.receive_identity(Identity::BOOTSTRAP);
        node.receive_identity(b);
        node.receive_identity(c);
        node.visits.insert(b, 3);
        node.visits.insert(c, 1);

        assert_eq!(node.update_ranking(), vec![Intent::RankingUpdateAfter(1000)]);
        let ranking = node.local_ranking();
        assert_eq!(ranking.len(), 2);
        assert!(ranking[&b] > ranking[&c]);
        assert!(!ranking.contains_key(&Identity::BOOTSTRAP));
    }
}
