// src/no_gossip.rs

//! Adversary that withholds received messages from its neighbors.

use multiverse_core::{
    AdversaryNode, Color, MajorityStrategy, Message, NetworkSubstrate, Node, NodeInterface, PeerId,
    Tangle, TangleConfig,
};
use std::sync::{Arc, RwLock};

/// Adversary node that receives and processes gossip but never relays it.
///
/// Its own messages are still broadcast, and its opinion follows the honest
/// majority rule.
pub struct NoGossipNode {
    node: Node,
    assigned: Arc<RwLock<Color>>,
}

impl NoGossipNode {
    /// Creates a no-gossip adversary
    pub fn new(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
    ) -> Self {
        let tangle =
            Tangle::with_options(peer_id, config, substrate, Box::new(MajorityStrategy), false);

        Self {
            node: Node::with_tangle(tangle),
            assigned: Arc::new(RwLock::new(Color::Undefined)),
        }
    }

    /// Color assigned by the harness for the double-spend trigger
    pub fn assigned_color(&self) -> Color {
        self.assigned.read().map(|color| *color).unwrap_or_default()
    }
}

impl NodeInterface for NoGossipNode {
    fn tangle(&self) -> &Tangle {
        self.node.tangle()
    }

    fn issue_payload(&self, payload: Color) {
        self.node.issue_payload(payload);
    }

    fn handle_incoming(&self, message: Message, from: PeerId) {
        self.node.handle_incoming(message, from);
    }
}

impl AdversaryNode for NoGossipNode {
    fn assign_color(&self, color: Color) {
        if let Ok(mut assigned) = self.assigned.write() {
            *assigned = color;
        }
    }
}
