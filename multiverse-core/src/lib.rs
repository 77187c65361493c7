// src/lib.rs

//! # Multiverse Core
//!
//! Per-node tangle engine for the multiverse consensus simulator.
//!
//! Each simulated peer owns a [`Tangle`]: a DAG of messages together with
//! the machinery that books incoming gossip, propagates witness weight over
//! the past cone, derives an opinion on a contended color from branch
//! weights, and confirms messages and colors once enough mana stands behind
//! them.
//!
//! ## Architecture
//!
//! - **Storage** — content-addressed message store with per-message metadata
//! - **Requester** — recovery of parents referenced before they arrive
//! - **TipManager** — per-branch frontiers and tip selection
//! - **MessageFactory** — composition of newly issued messages
//! - **ApprovalManager** — witness-weight propagation and confirmation
//! - **OpinionManager** — branch weights, opinion, color confirmation
//! - **Tangle** — the pipeline wiring it all together
//!
//! Everything observable happens through the event surface: each component
//! exposes [`events::Event`] registries the harness attaches closures to.
//! The network is consumed through the [`substrate::NetworkSubstrate`]
//! contract and never implemented here.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod approvalmanager;
pub mod color;
pub mod config;
pub mod errors;
pub mod events;
pub mod message;
pub mod messagefactory;
pub mod node;
pub mod opinionmanager;
pub mod requester;
pub mod storage;
pub mod substrate;
pub mod tangle;
pub mod tipmanager;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use crate::approvalmanager::ApprovalManager;
pub use crate::color::Color;
pub use crate::config::{TangleConfig, TipSelectorKind};
pub use crate::errors::{Result, TangleError};
pub use crate::events::Event;
pub use crate::message::{Message, MessageMetadata};
pub use crate::messagefactory::MessageFactory;
pub use crate::node::{AdversaryNode, Node, NodeInterface};
pub use crate::opinionmanager::{MajorityStrategy, OpinionManager, OpinionStrategy};
pub use crate::requester::Requester;
pub use crate::storage::{Storage, StoreOutcome};
pub use crate::substrate::{NetworkSubstrate, Packet};
pub use crate::tangle::Tangle;
pub use crate::tipmanager::TipManager;
pub use crate::types::{MessageId, PeerId};
