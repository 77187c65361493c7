// src/lib.rs

//! # Multiverse Adversary
//!
//! Node variants that deviate from honest behavior, used to study the
//! robustness of the consensus under attack:
//!
//! - [`ShiftingOpinionNode`] keeps backing whichever color is currently
//!   losing, prolonging the conflict
//! - [`SameOpinionNode`] stays locked to its group's assigned color and
//!   ignores observed branch weights
//! - [`NoGossipNode`] processes received messages but never forwards them
//!
//! All variants implement the same [`multiverse_core::NodeInterface`] as the
//! honest node plus [`multiverse_core::AdversaryNode::assign_color`], which
//! the harness calls before the adversary starts issuing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod no_gossip;
pub mod same_opinion;
pub mod shifting_opinion;

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::no_gossip::NoGossipNode;
pub use crate::same_opinion::SameOpinionNode;
pub use crate::shifting_opinion::ShiftingOpinionNode;
