// src/types.rs

//! Core identifier types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a peer in the simulated network
pub type PeerId = usize;

/// Counter backing [`MessageId::new`]. Zero is reserved for the genesis.
static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Globally unique message identifier.
///
/// Identifiers are drawn from a process-wide counter so that every message
/// created by any simulated peer is distinct, which lets storage be
/// content-addressed without hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// The distinguished DAG root that every node implicitly knows
    pub const GENESIS: MessageId = MessageId(0);

    /// Allocates a fresh, globally unique identifier
    pub fn new() -> Self {
        MessageId(MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the number of identifiers allocated so far across all peers
    pub fn created_count() -> u64 {
        MESSAGE_ID_COUNTER.load(Ordering::Relaxed) - 1
    }

    /// Checks whether this is the genesis identifier
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_genesis() {
            write!(f, "Genesis")
        } else {
            write!(f, "Message({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(!a.is_genesis());
    }

    #[test]
    fn test_genesis_display() {
        assert_eq!(format!("{}", MessageId::GENESIS), "Genesis");
        assert!(MessageId::GENESIS.is_genesis());
    }
}
