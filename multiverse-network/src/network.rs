// src/network.rs

//! Network assembly and the simulated delivery substrate.
//!
//! The network builds the peers (honest and adversarial), wires them with a
//! Watts–Strogatz topology, distributes mana by Zipf rank, and implements
//! the delivery substrate the tangles consume: every send spawns a task
//! that sleeps the link delay, rolls the packet-loss dice, and pushes into
//! the target's inbox.

use crate::errors::{NetworkError, Result};
use crate::peer::{Peer, PeerNode};
use crate::topology::{watts_strogatz, zipf_weights};
use multiverse_core::{Color, NetworkSubstrate, Packet, PeerId, TangleConfig};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Behavior classes a peer can be built with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdversaryType {
    /// Honest node
    Honest,
    /// Keeps backing the losing color
    ShiftOpinion,
    /// Locked to the group's assigned color
    SameOpinion,
    /// Processes but never forwards gossip
    NoGossip,
}

impl AdversaryType {
    /// Decodes the integer encoding used in configuration files
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AdversaryType::ShiftOpinion,
            2 => AdversaryType::SameOpinion,
            3 => AdversaryType::NoGossip,
            _ => AdversaryType::Honest,
        }
    }
}

/// Builds a node for a peer; the network calls one per peer
pub type NodeFactory =
    Box<dyn Fn(PeerId, Arc<dyn NetworkSubstrate>, TangleConfig) -> PeerNode + Send + Sync>;

/// Adversary group requested by the harness
pub struct AdversaryGroupSpec {
    /// Behavior of the group's members
    pub kind: AdversaryType,

    /// Number of peers in the group
    pub node_count: usize,

    /// Color the group is assigned at the double-spend trigger
    pub init_color: Color,

    /// Overrides the Zipf mana of each member with this share of the total,
    /// when set
    pub mana_share: Option<f64>,

    /// Issuance-rate multiplier relative to the group's mana
    pub speedup: f64,

    /// Peers of this group additionally link to every other peer
    pub peer_with_everyone: bool,
}

/// A materialized adversary group
pub struct AdversaryGroup {
    /// Behavior of the group's members
    pub kind: AdversaryType,

    /// Peers belonging to the group
    pub node_ids: Vec<PeerId>,

    /// Color assigned at the double-spend trigger
    pub init_color: Color,

    /// Combined mana of the members
    pub group_mana: u64,

    /// Issuance-rate multiplier
    pub speedup: f64,
}

/// Link and topology parameters
pub struct NetworkOptions {
    /// Lower bound of the per-link delay
    pub min_delay: Duration,

    /// Upper bound of the per-link delay
    pub max_delay: Duration,

    /// Probability that a packet is dropped on a link
    pub packet_loss: f64,

    /// Ring degree of the Watts–Strogatz topology
    pub neighbor_count: usize,

    /// Rewiring probability of the Watts–Strogatz topology
    pub randomness: f64,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            packet_loss: 0.0,
            neighbor_count: 8,
            randomness: 1.0,
        }
    }
}

/// One directed link between neighbors
#[derive(Clone, Copy, Debug)]
struct Link {
    delay: Duration,
    loss: f64,
}

/// The delivery substrate handed to every tangle
pub struct SimulatedNetwork {
    weights: Vec<u64>,
    total_weight: u64,
    links: RwLock<HashMap<(PeerId, PeerId), Link>>,
    inboxes: RwLock<HashMap<PeerId, mpsc::UnboundedSender<(PeerId, Packet)>>>,
}

impl SimulatedNetwork {
    fn new(weights: Vec<u64>) -> Self {
        let total_weight = weights.iter().sum();
        Self {
            weights,
            total_weight,
            links: RwLock::new(HashMap::new()),
            inboxes: RwLock::new(HashMap::new()),
        }
    }

    fn add_link(&self, from: PeerId, to: PeerId, link: Link) {
        if let Ok(mut links) = self.links.write() {
            links.insert((from, to), link);
        }
    }

    fn register_inbox(&self, peer: PeerId, sender: mpsc::UnboundedSender<(PeerId, Packet)>) {
        if let Ok(mut inboxes) = self.inboxes.write() {
            inboxes.insert(peer, sender);
        }
    }

    /// Delay configured for a link, if the peers are neighbors
    pub fn link_delay(&self, from: PeerId, to: PeerId) -> Option<Duration> {
        self.links
            .read()
            .ok()
            .and_then(|links| links.get(&(from, to)).map(|link| link.delay))
    }
}

impl NetworkSubstrate for SimulatedNetwork {
    fn neighbors(&self, peer: PeerId) -> Vec<PeerId> {
        match self.links.read() {
            Ok(links) => links
                .keys()
                .filter(|(from, _)| *from == peer)
                .map(|(_, to)| *to)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn send(&self, from: PeerId, to: PeerId, packet: Packet) {
        let link = match self.links.read() {
            Ok(links) => match links.get(&(from, to)) {
                Some(link) => *link,
                None => {
                    debug!(from, to, "dropping packet: peers are not neighbors");
                    return;
                }
            },
            Err(_) => return,
        };

        let sender = match self.inboxes.read() {
            Ok(inboxes) => match inboxes.get(&to) {
                Some(sender) => sender.clone(),
                None => {
                    debug!(to, "dropping packet: no inbox registered");
                    return;
                }
            },
            Err(_) => return,
        };

        tokio::spawn(async move {
            tokio::time::sleep(link.delay).await;
            if link.loss > 0.0 && rand::thread_rng().gen::<f64>() < link.loss {
                debug!(from, to, "packet lost");
                return;
            }
            // a closed inbox means the peer shut down; the payload drops
            let _ = sender.send((from, packet));
        });
    }

    fn weight(&self, peer: PeerId) -> u64 {
        self.weights.get(peer).copied().unwrap_or(0)
    }

    fn total_weight(&self) -> u64 {
        self.total_weight
    }
}

/// The simulated peer-to-peer network
pub struct Network {
    substrate: Arc<SimulatedNetwork>,
    peers: Vec<Arc<Peer>>,
    adversary_groups: Vec<AdversaryGroup>,
    adversary_membership: HashMap<PeerId, usize>,
    speedups: Vec<f64>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Network {
    /// Assembles a network of `node_count` peers.
    ///
    /// Adversary groups claim peer ids from the tail of the id space; all
    /// remaining peers are built with the `Honest` factory.
    pub fn new(
        node_count: usize,
        total_weight: u64,
        zipf_parameter: f64,
        factories: &HashMap<AdversaryType, NodeFactory>,
        tangle_config: TangleConfig,
        options: NetworkOptions,
        adversary_specs: &[AdversaryGroupSpec],
    ) -> Result<Self> {
        if node_count == 0 {
            return Err(NetworkError::InvalidConfiguration(
                "node_count must be positive".to_string(),
            ));
        }
        tangle_config.validate()?;

        let adversary_count: usize = adversary_specs.iter().map(|spec| spec.node_count).sum();
        if adversary_count >= node_count {
            return Err(NetworkError::InvalidConfiguration(format!(
                "{} adversary nodes leave no honest peer among {}",
                adversary_count, node_count
            )));
        }

        // mana by Zipf rank, with per-group overrides
        let mut weights = zipf_weights(node_count, zipf_parameter, total_weight);
        let mut adversary_groups = Vec::new();
        let mut adversary_membership = HashMap::new();
        let mut speedups = vec![1.0; node_count];
        let mut peering_all: HashSet<PeerId> = HashSet::new();

        let mut next_id = node_count;
        for spec in adversary_specs {
            let node_ids: Vec<PeerId> = (0..spec.node_count)
                .map(|_| {
                    next_id -= 1;
                    next_id
                })
                .collect();

            for id in &node_ids {
                if let Some(share) = spec.mana_share {
                    weights[*id] =
                        (total_weight as f64 * share / spec.node_count as f64) as u64;
                }
                speedups[*id] = spec.speedup;
                adversary_membership.insert(*id, adversary_groups.len());
                if spec.peer_with_everyone {
                    peering_all.insert(*id);
                }
            }

            let group_mana = node_ids.iter().map(|id| weights[*id]).sum();
            adversary_groups.push(AdversaryGroup {
                kind: spec.kind,
                node_ids,
                init_color: spec.init_color,
                group_mana,
                speedup: spec.speedup,
            });
        }

        let substrate = Arc::new(SimulatedNetwork::new(weights));

        // topology and links
        let mut rng = rand::thread_rng();
        let mut edges = watts_strogatz(
            node_count,
            options.neighbor_count,
            options.randomness,
            &mut rng,
        );
        for peer in &peering_all {
            for other in 0..node_count {
                if other != *peer {
                    let key = if *peer < other {
                        (*peer, other)
                    } else {
                        (other, *peer)
                    };
                    edges.insert(key);
                }
            }
        }

        for (a, b) in edges {
            let delay = if options.max_delay > options.min_delay {
                rng.gen_range(options.min_delay..=options.max_delay)
            } else {
                options.min_delay
            };
            let link = Link {
                delay,
                loss: options.packet_loss,
            };
            substrate.add_link(a, b, link);
            substrate.add_link(b, a, link);
        }

        // nodes and peers
        let mut peers = Vec::with_capacity(node_count);
        for id in 0..node_count {
            let kind = adversary_membership
                .get(&id)
                .map(|group| adversary_groups[*group].kind)
                .unwrap_or(AdversaryType::Honest);
            let factory = factories.get(&kind).ok_or_else(|| {
                NetworkError::InvalidConfiguration(format!(
                    "no node factory registered for {:?}",
                    kind
                ))
            })?;

            let (sender, receiver) = mpsc::unbounded_channel();
            substrate.register_inbox(id, sender);

            let node = factory(
                id,
                substrate.clone() as Arc<dyn NetworkSubstrate>,
                tangle_config.clone(),
            );
            peers.push(Arc::new(Peer::new(id, node, receiver)));
        }

        let (shutdown, _) = watch::channel(false);

        info!(
            nodes = node_count,
            adversaries = adversary_count,
            total_mana = substrate.total_weight(),
            "network assembled"
        );

        Ok(Self {
            substrate,
            peers,
            adversary_groups,
            adversary_membership,
            speedups,
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawns every peer's inbox consumer
    pub fn start(&self) {
        let mut handles = match self.handles.lock() {
            Ok(handles) => handles,
            Err(_) => return,
        };
        for peer in &self.peers {
            handles.push(peer.start(self.substrate.clone(), self.shutdown.subscribe()));
        }
        info!(peers = self.peers.len(), "network started");
    }

    /// Signals every consumer to stop; in-flight deliveries drop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        info!("network shutdown signalled");
    }

    /// The substrate handed to the tangles
    pub fn substrate(&self) -> Arc<SimulatedNetwork> {
        self.substrate.clone()
    }

    /// All peers, indexed by id
    pub fn peers(&self) -> &[Arc<Peer>] {
        &self.peers
    }

    /// One peer by id
    pub fn peer(&self, id: PeerId) -> Option<&Arc<Peer>> {
        self.peers.get(id)
    }

    /// Whether a peer belongs to an adversary group
    pub fn is_adversary(&self, id: PeerId) -> bool {
        self.adversary_membership.contains_key(&id)
    }

    /// The materialized adversary groups
    pub fn adversary_groups(&self) -> &[AdversaryGroup] {
        &self.adversary_groups
    }

    /// Issuance-rate multiplier of a peer (1.0 for honest peers)
    pub fn speedup(&self, id: PeerId) -> f64 {
        self.speedups.get(id).copied().unwrap_or(1.0)
    }

    /// Mana of a peer
    pub fn weight(&self, id: PeerId) -> u64 {
        self.substrate.weight(id)
    }

    /// Sum of all peer manas
    pub fn total_weight(&self) -> u64 {
        self.substrate.total_weight()
    }

    /// The heaviest honest peers, used by the accidental double-spend mode
    pub fn heaviest_honest_peers(&self, count: usize) -> Vec<PeerId> {
        let mut honest: Vec<PeerId> = (0..self.peers.len())
            .filter(|id| !self.is_adversary(*id))
            .collect();
        honest.sort_by_key(|id| std::cmp::Reverse(self.weight(*id)));
        honest.truncate(count);
        honest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiverse_core::{Node, NodeInterface};

    fn honest_factories() -> HashMap<AdversaryType, NodeFactory> {
        let mut factories: HashMap<AdversaryType, NodeFactory> = HashMap::new();
        factories.insert(
            AdversaryType::Honest,
            Box::new(|id, substrate, config| {
                PeerNode::Honest(Box::new(Node::new(id, config, substrate)))
            }),
        );
        factories
    }

    fn fast_options() -> NetworkOptions {
        NetworkOptions {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            packet_loss: 0.0,
            neighbor_count: 4,
            randomness: 0.0,
        }
    }

    #[tokio::test]
    async fn test_network_assembly() {
        let network = Network::new(
            5,
            1_000,
            0.9,
            &honest_factories(),
            TangleConfig::default(),
            fast_options(),
            &[],
        )
        .unwrap();

        assert_eq!(network.peers().len(), 5);
        assert_eq!(network.total_weight(), 1_000);
        assert!(!network.is_adversary(0));
        assert!(!network.substrate().neighbors(0).is_empty());
    }

    #[tokio::test]
    async fn test_adversary_groups_claim_tail_ids() {
        let mut factories = honest_factories();
        factories.insert(
            AdversaryType::NoGossip,
            Box::new(|id, substrate, config| {
                // honest node standing in; only group bookkeeping is under test
                PeerNode::Honest(Box::new(Node::new(id, config, substrate)))
            }),
        );

        let specs = vec![AdversaryGroupSpec {
            kind: AdversaryType::NoGossip,
            node_count: 2,
            init_color: Color::Blue,
            mana_share: None,
            speedup: 2.0,
            peer_with_everyone: false,
        }];

        let network = Network::new(
            6,
            1_000,
            0.0,
            &factories,
            TangleConfig::default(),
            fast_options(),
            &specs,
        )
        .unwrap();

        assert!(network.is_adversary(5));
        assert!(network.is_adversary(4));
        assert!(!network.is_adversary(3));
        assert_eq!(network.speedup(5), 2.0);
        assert_eq!(network.speedup(0), 1.0);
        assert_eq!(network.adversary_groups().len(), 1);
        assert_eq!(network.adversary_groups()[0].node_ids, vec![5, 4]);
    }

    async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_gossip_reaches_every_peer() {
        let network = Network::new(
            4,
            1_000,
            0.9,
            &honest_factories(),
            TangleConfig::default(),
            fast_options(),
            &[],
        )
        .unwrap();
        network.start();

        network.peer(0).unwrap().node().issue_payload(Color::Red);

        let peers = network.peers().to_vec();
        let delivered = wait_until(Duration::from_secs(2), || {
            peers.iter().all(|peer| {
                peer.node().tangle().storage.message_count().unwrap() == 1
                    && peer.node().tangle().opinion_manager.opinion() == Color::Red
            })
        })
        .await;
        assert!(delivered, "gossip did not reach every peer in time");

        network.shutdown();
    }

    #[tokio::test]
    async fn test_total_packet_loss_blocks_delivery() {
        let options = NetworkOptions {
            packet_loss: 1.0,
            ..fast_options()
        };
        let network = Network::new(
            2,
            100,
            0.0,
            &honest_factories(),
            TangleConfig::default(),
            options,
            &[],
        )
        .unwrap();
        network.start();

        network.peer(0).unwrap().node().issue_payload(Color::Red);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let receiver = network.peer(1).unwrap();
        assert_eq!(
            receiver.node().tangle().storage.message_count().unwrap(),
            0
        );

        network.shutdown();
    }

    #[tokio::test]
    async fn test_missing_parent_recovered_over_the_wire() {
        use multiverse_core::{Message, MessageId};
        use std::time::Instant;

        let config = TangleConfig {
            request_interval_ms: 20,
            ..Default::default()
        };
        let network = Network::new(
            2,
            100,
            0.0,
            &honest_factories(),
            config,
            fast_options(),
            &[],
        )
        .unwrap();
        network.start();

        let parent = Message {
            id: MessageId::new(),
            strong_parents: [MessageId::GENESIS].into_iter().collect(),
            weak_parents: Default::default(),
            issuer: 0,
            payload: Color::Red,
            issuance_time: Instant::now(),
            sequence_number: 1,
            height: 1,
        };
        let child = Message {
            id: MessageId::new(),
            strong_parents: [parent.id].into_iter().collect(),
            weak_parents: Default::default(),
            issuer: 0,
            payload: Color::Undefined,
            issuance_time: Instant::now(),
            sequence_number: 2,
            height: 2,
        };

        // peer 0 knows both; marking them as received suppresses relaying
        let holder = network.peer(0).unwrap().node().tangle();
        holder.process_message(parent.clone(), Some(1)).unwrap();
        holder.process_message(child.clone(), Some(1)).unwrap();

        // peer 1 only receives the child and must recover the parent
        network
            .substrate()
            .send(0, 1, Packet::Message(child.clone()));

        let searcher = network.peer(1).unwrap().clone();
        let child_id = child.id;
        let recovered = wait_until(Duration::from_secs(2), move || {
            searcher
                .node()
                .tangle()
                .storage
                .metadata_snapshot(&child_id)
                .unwrap()
                .map(|metadata| metadata.eligible)
                .unwrap_or(false)
        })
        .await;
        assert!(recovered, "child was never booked on the requesting peer");

        let searcher = network.peer(1).unwrap();
        let parent_metadata = searcher
            .node()
            .tangle()
            .storage
            .metadata_snapshot(&parent.id)
            .unwrap()
            .unwrap();
        assert!(parent_metadata.eligible);
        assert!(!searcher.node().tangle().requester.is_requested(&parent.id));

        network.shutdown();
    }

    #[tokio::test]
    async fn test_rejects_all_adversary_network() {
        let specs = vec![AdversaryGroupSpec {
            kind: AdversaryType::SameOpinion,
            node_count: 3,
            init_color: Color::Blue,
            mana_share: None,
            speedup: 1.0,
            peer_with_everyone: false,
        }];

        let result = Network::new(
            3,
            100,
            0.0,
            &honest_factories(),
            TangleConfig::default(),
            fast_options(),
            &specs,
        );
        assert!(result.is_err());
    }
}
