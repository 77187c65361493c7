// src/testutil.rs

//! Substrate stand-ins for unit tests.

use crate::node::NodeInterface;
use crate::substrate::{NetworkSubstrate, Packet};
use crate::types::PeerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Records every send and answers weight queries from a fixed table.
pub(crate) struct StubSubstrate {
    weights: Vec<u64>,
    sent: Mutex<Vec<(PeerId, PeerId, Packet)>>,
}

impl StubSubstrate {
    pub(crate) fn shared(weights: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            weights,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl NetworkSubstrate for StubSubstrate {
    fn neighbors(&self, peer: PeerId) -> Vec<PeerId> {
        (0..self.weights.len()).filter(|id| *id != peer).collect()
    }

    fn send(&self, from: PeerId, to: PeerId, packet: Packet) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((from, to, packet));
        }
    }

    fn weight(&self, peer: PeerId) -> u64 {
        self.weights.get(peer).copied().unwrap_or(0)
    }

    fn total_weight(&self) -> u64 {
        self.weights.iter().sum()
    }
}

/// Full-mesh substrate that delivers synchronously to registered nodes;
/// deterministic end-to-end tests run on it without a runtime.
pub(crate) struct SyncRouter {
    weights: Vec<u64>,
    nodes: RwLock<HashMap<PeerId, Arc<dyn NodeInterface>>>,
}

impl SyncRouter {
    pub(crate) fn shared(weights: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            weights,
            nodes: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn register(&self, id: PeerId, node: Arc<dyn NodeInterface>) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(id, node);
        }
    }
}

impl NetworkSubstrate for SyncRouter {
    fn neighbors(&self, peer: PeerId) -> Vec<PeerId> {
        (0..self.weights.len()).filter(|id| *id != peer).collect()
    }

    fn send(&self, from: PeerId, to: PeerId, packet: Packet) {
        let node = match self.nodes.read() {
            Ok(nodes) => nodes.get(&to).cloned(),
            Err(_) => None,
        };
        let node = match node {
            Some(node) => node,
            None => return,
        };

        match packet {
            Packet::Message(message) => node.handle_incoming(message, from),
            Packet::Request(id) => {
                if let Ok(Some(message)) = node.tangle().storage.message(&id) {
                    self.send(to, from, Packet::Message(message));
                }
            }
        }
    }

    fn weight(&self, peer: PeerId) -> u64 {
        self.weights.get(peer).copied().unwrap_or(0)
    }

    fn total_weight(&self) -> u64 {
        self.weights.iter().sum()
    }
}
