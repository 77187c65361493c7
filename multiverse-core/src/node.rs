// src/node.rs

//! Node contract and the honest node.

use crate::color::Color;
use crate::config::TangleConfig;
use crate::substrate::NetworkSubstrate;
use crate::tangle::Tangle;
use crate::types::PeerId;
use std::sync::Arc;
use tracing::warn;

/// Contract implemented by every node variant, honest or adversarial
pub trait NodeInterface: Send + Sync {
    /// Access to the node's tangle and its event surface
    fn tangle(&self) -> &Tangle;

    /// Mints and broadcasts a new message with the given payload color
    fn issue_payload(&self, payload: Color);

    /// Entry point for gossiped messages
    fn handle_incoming(&self, message: crate::message::Message, from: PeerId);
}

/// Additional contract of adversary variants
pub trait AdversaryNode: NodeInterface {
    /// Assigns the color the adversary works with; called by the harness
    /// before the adversary starts issuing
    fn assign_color(&self, color: Color);
}

/// The honest node: majority opinion, full relaying
pub struct Node {
    tangle: Tangle,
}

impl Node {
    /// Creates an honest node
    pub fn new(peer_id: PeerId, config: TangleConfig, substrate: Arc<dyn NetworkSubstrate>) -> Self {
        Self {
            tangle: Tangle::new(peer_id, config, substrate),
        }
    }

    /// Wraps an already-built tangle; adversary variants use this to supply
    /// their own opinion strategy or relay behavior
    pub fn with_tangle(tangle: Tangle) -> Self {
        Self { tangle }
    }
}

impl NodeInterface for Node {
    fn tangle(&self) -> &Tangle {
        &self.tangle
    }

    fn issue_payload(&self, payload: Color) {
        if let Err(e) = self.tangle.issue_message(payload) {
            warn!(peer = self.tangle.peer_id(), "failed to issue message: {}", e);
        }
    }

    fn handle_incoming(&self, message: crate::message::Message, from: PeerId) {
        if let Err(e) = self.tangle.process_message(message, Some(from)) {
            warn!(
                peer = self.tangle.peer_id(),
                "failed to process message from {}: {}", from, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubSubstrate;

    #[test]
    fn test_honest_node_issues_and_gossips() {
        let substrate = StubSubstrate::shared(vec![60, 40]);
        let node = Node::new(0, TangleConfig::default(), substrate.clone());

        node.issue_payload(Color::Red);

        assert_eq!(node.tangle().storage.message_count().unwrap(), 1);
        // the message went out to the only neighbor
        assert_eq!(substrate.sent_count(), 1);
    }
}
