// src/substrate.rs

//! Contract between the tangle and the delivery substrate.
//!
//! The tangle consumes this interface; it never implements it. The network
//! crate provides the simulated implementation with per-link delay and
//! packet loss, and tests supply synchronous stand-ins.

use crate::message::Message;
use crate::types::{MessageId, PeerId};

/// Unit of delivery between peers
#[derive(Clone, Debug)]
pub enum Packet {
    /// A gossiped message
    Message(Message),

    /// A request to re-send a missing message; the holder answers with a
    /// `Packet::Message` over the same link
    Request(MessageId),
}

/// Delivery substrate and mana oracle consumed by the tangle
pub trait NetworkSubstrate: Send + Sync {
    /// Neighbors of a peer under the configured topology
    fn neighbors(&self, peer: PeerId) -> Vec<PeerId>;

    /// Sends a packet over the `from -> to` link, subject to the link's
    /// delay and packet loss; delivery is best-effort
    fn send(&self, from: PeerId, to: PeerId, packet: Packet);

    /// Mana of a peer
    fn weight(&self, peer: PeerId) -> u64;

    /// Sum of all peer manas
    fn total_weight(&self) -> u64;
}
