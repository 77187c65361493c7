// src/lib.rs

//! # Multiverse Network
//!
//! Simulated delivery substrate for the multiverse consensus simulator.
//!
//! This crate owns everything between the tangles: peers and their inbox
//! consumers, links with configurable delay and packet loss, the
//! Watts–Strogatz topology, the Zipf mana distribution, and adversary group
//! bookkeeping. The tangles in `multiverse-core` consume it exclusively
//! through the `NetworkSubstrate` contract.
//!
//! ## Delivery model
//!
//! Every `send` spawns a task that sleeps the link delay, rolls the
//! packet-loss dice, and pushes into the target peer's inbox. One consumer
//! task per peer drains the inbox, which serializes the per-peer pipeline;
//! a shutdown signal stops the consumers between messages, and in-flight
//! deliveries drop their payload.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod errors;
pub mod network;
pub mod peer;
pub mod topology;

// Re-export commonly used types
pub use crate::errors::{NetworkError, Result};
pub use crate::network::{
    AdversaryGroup, AdversaryGroupSpec, AdversaryType, Network, NetworkOptions, NodeFactory,
    SimulatedNetwork,
};
pub use crate::peer::{Peer, PeerNode};
pub use crate::topology::{watts_strogatz, zipf_weights};
