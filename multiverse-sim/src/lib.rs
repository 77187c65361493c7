// src/lib.rs

//! # Multiverse Sim
//!
//! Simulation harness for the multiverse consensus protocol.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            multiverse-sim                │
//! │   config · issuance pacing · monitor     │
//! ├──────────────────────────────────────────┤
//! │          multiverse-network              │
//! │   peers · links · topology · mana        │
//! ├───────────────────┬──────────────────────┤
//! │  multiverse-core  │ multiverse-adversary │
//! │  tangle engine    │ deviant node variants│
//! └───────────────────┴──────────────────────┘
//! ```
//!
//! The harness assembles the network from a JSON configuration, paces each
//! peer's issuance by its mana share, triggers a double spend after a
//! configurable delay, and watches the event surface until consensus is
//! reached or the run times out.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod monitor;
pub mod runner;

// Re-export commonly used types
pub use crate::config::{AdversaryGroupConfig, Imif, SimConfig, SimulationMode};
pub use crate::errors::{Result, SimError};
pub use crate::monitor::{AtomicCounters, ColorCounters, Monitor};
pub use crate::runner::{node_factories, Simulation};

/// Simulator version
pub const SIM_VERSION: &str = env!("CARGO_PKG_VERSION");
