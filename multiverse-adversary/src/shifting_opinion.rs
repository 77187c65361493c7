// src/shifting_opinion.rs

//! Adversary that keeps backing the losing color.

use multiverse_core::{
    AdversaryNode, Color, MajorityStrategy, Message, NetworkSubstrate, Node, NodeInterface,
    OpinionStrategy, PeerId, Tangle, TangleConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Opinion strategy that picks the lightest conflict branch still carrying
/// weight; while at most one branch does, it falls back to the assigned
/// color (or to the honest majority before any color was assigned).
struct ShiftingOpinionStrategy {
    assigned: Arc<RwLock<Color>>,
}

impl OpinionStrategy for ShiftingOpinionStrategy {
    fn derive(&self, weights: &HashMap<Color, i64>, current: Color) -> Color {
        let mut contested: Vec<(Color, i64)> = Color::CONFLICT_COLORS
            .iter()
            .filter_map(|color| {
                let weight = *weights.get(color).unwrap_or(&0);
                (weight > 0).then_some((*color, weight))
            })
            .collect();

        if contested.len() >= 2 {
            contested.sort_by(|a, b| a.1.cmp(&b.1).then(b.0.rank().cmp(&a.0.rank())));
            return contested[0].0;
        }

        let assigned = self.assigned.read().map(|color| *color).unwrap_or_default();
        if assigned != Color::Undefined {
            assigned
        } else {
            MajorityStrategy.derive(weights, current)
        }
    }
}

/// Adversary node that periodically switches to whichever color is losing
pub struct ShiftingOpinionNode {
    node: Node,
    assigned: Arc<RwLock<Color>>,
}

impl ShiftingOpinionNode {
    /// Creates a shifting-opinion adversary
    pub fn new(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
    ) -> Self {
        let assigned = Arc::new(RwLock::new(Color::Undefined));
        let strategy = ShiftingOpinionStrategy {
            assigned: assigned.clone(),
        };
        let tangle = Tangle::with_options(peer_id, config, substrate, Box::new(strategy), true);

        Self {
            node: Node::with_tangle(tangle),
            assigned,
        }
    }
}

impl NodeInterface for ShiftingOpinionNode {
    fn tangle(&self) -> &Tangle {
        self.node.tangle()
    }

    fn issue_payload(&self, payload: Color) {
        // uncolored issuance is re-stamped with the shifted opinion, so the
        // adversary's mana visibly backs the losing branch
        let payload = if payload == Color::Undefined {
            self.tangle().opinion_manager.opinion()
        } else {
            payload
        };
        self.node.issue_payload(payload);
    }

    fn handle_incoming(&self, message: Message, from: PeerId) {
        self.node.handle_incoming(message, from);
    }
}

impl AdversaryNode for ShiftingOpinionNode {
    fn assign_color(&self, color: Color) {
        if let Ok(mut assigned) = self.assigned.write() {
            *assigned = color;
        }
        if let Err(e) = self.tangle().opinion_manager.update_opinion() {
            warn!(
                peer = self.tangle().peer_id(),
                "failed to refresh shifted opinion: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_picks_the_losing_branch() {
        let assigned = Arc::new(RwLock::new(Color::Blue));
        let strategy = ShiftingOpinionStrategy { assigned };

        let mut weights = HashMap::new();
        weights.insert(Color::Red, 70);
        weights.insert(Color::Blue, 30);
        assert_eq!(strategy.derive(&weights, Color::Undefined), Color::Blue);

        weights.insert(Color::Blue, 80);
        assert_eq!(strategy.derive(&weights, Color::Undefined), Color::Red);
    }

    #[test]
    fn test_single_contested_branch_falls_back_to_assigned() {
        let assigned = Arc::new(RwLock::new(Color::Green));
        let strategy = ShiftingOpinionStrategy { assigned };

        let mut weights = HashMap::new();
        weights.insert(Color::Red, 70);
        assert_eq!(strategy.derive(&weights, Color::Red), Color::Green);
    }

    #[test]
    fn test_unassigned_strategy_is_honest() {
        let assigned = Arc::new(RwLock::new(Color::Undefined));
        let strategy = ShiftingOpinionStrategy { assigned };

        let mut weights = HashMap::new();
        weights.insert(Color::Red, 70);
        assert_eq!(strategy.derive(&weights, Color::Undefined), Color::Red);
    }
}
