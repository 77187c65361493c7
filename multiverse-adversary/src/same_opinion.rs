// src/same_opinion.rs

//! Group-coordinated adversary locked to one color.

use multiverse_core::{
    AdversaryNode, Color, Message, NetworkSubstrate, Node, NodeInterface, OpinionStrategy, PeerId,
    Tangle, TangleConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Opinion strategy pinned to the assigned color, whatever the weights say
struct FixedOpinionStrategy {
    assigned: Arc<RwLock<Color>>,
}

impl OpinionStrategy for FixedOpinionStrategy {
    fn derive(&self, _weights: &HashMap<Color, i64>, current: Color) -> Color {
        let assigned = self.assigned.read().map(|color| *color).unwrap_or_default();
        if assigned != Color::Undefined {
            assigned
        } else {
            current
        }
    }
}

/// Adversary node that always issues its group's assigned color
pub struct SameOpinionNode {
    node: Node,
    assigned: Arc<RwLock<Color>>,
}

impl SameOpinionNode {
    /// Creates a same-opinion adversary
    pub fn new(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
    ) -> Self {
        let assigned = Arc::new(RwLock::new(Color::Undefined));
        let strategy = FixedOpinionStrategy {
            assigned: assigned.clone(),
        };
        let tangle = Tangle::with_options(peer_id, config, substrate, Box::new(strategy), true);

        Self {
            node: Node::with_tangle(tangle),
            assigned,
        }
    }
}

impl NodeInterface for SameOpinionNode {
    fn tangle(&self) -> &Tangle {
        self.node.tangle()
    }

    fn issue_payload(&self, payload: Color) {
        // the group's color overrides uncolored issuance
        let assigned = self.assigned.read().map(|color| *color).unwrap_or_default();
        let payload = if payload == Color::Undefined && assigned != Color::Undefined {
            assigned
        } else {
            payload
        };
        self.node.issue_payload(payload);
    }

    fn handle_incoming(&self, message: Message, from: PeerId) {
        self.node.handle_incoming(message, from);
    }
}

impl AdversaryNode for SameOpinionNode {
    fn assign_color(&self, color: Color) {
        if let Ok(mut assigned) = self.assigned.write() {
            *assigned = color;
        }
        if let Err(e) = self.tangle().opinion_manager.update_opinion() {
            warn!(
                peer = self.tangle().peer_id(),
                "failed to refresh pinned opinion: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSubstrate;

    #[test]
    fn test_opinion_ignores_the_majority() {
        let substrate = RecordingSubstrate::shared(vec![90, 10]);
        let node = SameOpinionNode::new(1, TangleConfig::default(), substrate);
        node.assign_color(Color::Blue);

        // a heavy red statement arrives; the node stays blue
        let red = Message {
            payload: Color::Red,
            ..substrate_message(0, 1)
        };
        node.handle_incoming(red, 0);

        assert_eq!(node.tangle().opinion_manager.opinion(), Color::Blue);
    }

    #[test]
    fn test_uncolored_issuance_carries_the_assigned_color() {
        let substrate = RecordingSubstrate::shared(vec![90, 10]);
        let node = SameOpinionNode::new(1, TangleConfig::default(), substrate);
        node.assign_color(Color::Blue);

        node.issue_payload(Color::Undefined);

        let issued = node
            .tangle()
            .storage
            .message(&latest_issued(&node))
            .unwrap()
            .unwrap();
        assert_eq!(issued.payload, Color::Blue);
    }

    fn substrate_message(issuer: PeerId, sequence_number: u64) -> Message {
        Message {
            id: multiverse_core::MessageId::new(),
            strong_parents: [multiverse_core::MessageId::GENESIS].into_iter().collect(),
            weak_parents: Default::default(),
            issuer,
            payload: Color::Undefined,
            issuance_time: std::time::Instant::now(),
            sequence_number,
            height: 1,
        }
    }

    fn latest_issued(node: &SameOpinionNode) -> multiverse_core::MessageId {
        let (strong, _) = node
            .tangle()
            .tip_manager
            .tips(node.tangle().opinion_manager.opinion())
            .unwrap();
        strong.into_iter().next().unwrap()
    }
}
