// src/testutil.rs

//! Substrate stand-in for unit tests.

use multiverse_core::{NetworkSubstrate, Packet, PeerId};
use std::sync::{Arc, Mutex};

/// Records every send and answers weight queries from a fixed table.
pub(crate) struct RecordingSubstrate {
    weights: Vec<u64>,
    sent: Mutex<Vec<(PeerId, PeerId, Packet)>>,
}

impl RecordingSubstrate {
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

impl NetworkSubstrate for RecordingSubstrate {
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
