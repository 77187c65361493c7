// src/peer.rs

//! Peers and their inbox consumers.
//!
//! A peer owns its node (honest or adversarial) and an inbox the delivery
//! tasks push into. One consumer task per peer drains the inbox, which
//! serializes the tangle pipeline per peer; the same task ticks the
//! requester and answers message requests from local storage.

use crate::network::SimulatedNetwork;
use multiverse_core::{
    AdversaryNode, Color, Message, NetworkSubstrate, NodeInterface, Packet, PeerId, Tangle,
};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// A node behind a peer, with optional adversary capabilities
pub enum PeerNode {
    /// Honest node
    Honest(Box<dyn NodeInterface>),

    /// Adversary variant exposing `assign_color`
    Adversary(Box<dyn AdversaryNode>),
}

impl PeerNode {
    /// The node as the common interface
    pub fn node(&self) -> &dyn NodeInterface {
        self
    }

    /// The node's adversary surface, if it has one
    pub fn as_adversary(&self) -> Option<&dyn AdversaryNode> {
        match self {
            PeerNode::Honest(_) => None,
            PeerNode::Adversary(node) => Some(node.as_ref()),
        }
    }
}

impl NodeInterface for PeerNode {
    fn tangle(&self) -> &Tangle {
        match self {
            PeerNode::Honest(node) => node.tangle(),
            PeerNode::Adversary(node) => node.tangle(),
        }
    }

    fn issue_payload(&self, payload: Color) {
        match self {
            PeerNode::Honest(node) => node.issue_payload(payload),
            PeerNode::Adversary(node) => node.issue_payload(payload),
        }
    }

    fn handle_incoming(&self, message: Message, from: PeerId) {
        match self {
            PeerNode::Honest(node) => node.handle_incoming(message, from),
            PeerNode::Adversary(node) => node.handle_incoming(message, from),
        }
    }
}

/// A peer in the simulated network
pub struct Peer {
    /// The peer's identifier
    pub id: PeerId,

    node: PeerNode,

    /// Inbox receiver, taken by the consumer task on start
    inbox: Mutex<Option<mpsc::UnboundedReceiver<(PeerId, Packet)>>>,
}

impl Peer {
    /// Creates a peer around its node and inbox
    pub fn new(
        id: PeerId,
        node: PeerNode,
        inbox: mpsc::UnboundedReceiver<(PeerId, Packet)>,
    ) -> Self {
        Self {
            id,
            node,
            inbox: Mutex::new(Some(inbox)),
        }
    }

    /// The peer's node
    pub fn node(&self) -> &dyn NodeInterface {
        self.node.node()
    }

    /// The peer's adversary surface, if any
    pub fn as_adversary(&self) -> Option<&dyn AdversaryNode> {
        self.node.as_adversary()
    }

    /// Spawns the inbox consumer.
    ///
    /// The consumer exits when the shutdown signal fires or the inbox
    /// closes; in-flight deliveries to a stopped peer are dropped.
    pub fn start(
        self: &Arc<Self>,
        substrate: Arc<SimulatedNetwork>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let peer = self.clone();
        let mut inbox = match peer.inbox.lock() {
            Ok(mut slot) => match slot.take() {
                Some(inbox) => inbox,
                None => {
                    warn!(peer = peer.id, "peer started twice; consumer not spawned");
                    return tokio::spawn(async {});
                }
            },
            Err(_) => return tokio::spawn(async {}),
        };

        tokio::spawn(async move {
            let request_interval = peer.node().tangle().config().request_interval();
            let mut ticker = tokio::time::interval(request_interval);

            loop {
                tokio::select! {
                    delivery = inbox.recv() => match delivery {
                        Some((from, Packet::Message(message))) => {
                            peer.node().handle_incoming(message, from);
                        }
                        Some((from, Packet::Request(id))) => {
                            match peer.node().tangle().storage.message(&id) {
                                Ok(Some(message)) => {
                                    substrate.send(peer.id, from, Packet::Message(message));
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    warn!(peer = peer.id, "request lookup failed: {}", e);
                                }
                            }
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        let tangle = peer.node().tangle();
                        tangle.requester.reissue_stale(request_interval);
                    }
                    _ = shutdown.changed() => {
                        debug!(peer = peer.id, "consumer shutting down");
                        break;
                    }
                }
            }
        })
    }
}
