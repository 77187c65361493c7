// src/message.rs

//! Messages forming the DAG, and their mutable metadata.

use crate::color::Color;
use crate::types::{MessageId, PeerId};
use std::collections::HashSet;
use std::time::Instant;

/// An immutable record in the DAG.
///
/// A message is created once by its issuer's factory, gossiped to every
/// other peer, and never changes afterwards; all mutable per-message state
/// lives in [`MessageMetadata`].
#[derive(Clone, Debug)]
pub struct Message {
    /// Globally unique identifier
    pub id: MessageId,

    /// Messages this one approves; an empty set is read as `{Genesis}`
    pub strong_parents: HashSet<MessageId>,

    /// Referenced but not approved messages (may be empty)
    pub weak_parents: HashSet<MessageId>,

    /// Peer that created this message
    pub issuer: PeerId,

    /// Payload color; `Undefined` for uncolored messages
    pub payload: Color,

    /// Creation time at the issuer
    pub issuance_time: Instant,

    /// Monotonic per-issuer counter
    pub sequence_number: u64,

    /// One greater than the maximum height of the strong parents
    pub height: u32,
}

impl Message {
    /// Strong parents with the empty-set-means-genesis convention applied
    pub fn effective_strong_parents(&self) -> HashSet<MessageId> {
        if self.strong_parents.is_empty() {
            let mut parents = HashSet::new();
            parents.insert(MessageId::GENESIS);
            parents
        } else {
            self.strong_parents.clone()
        }
    }

    /// All referenced parents, strong and weak
    pub fn all_parents(&self) -> impl Iterator<Item = &MessageId> {
        self.strong_parents.iter().chain(self.weak_parents.iter())
    }
}

/// Mutable per-message state, owned by [`crate::storage::Storage`].
#[derive(Clone, Debug)]
pub struct MessageMetadata {
    /// When the local node first stored the message
    pub arrival_time: Instant,

    /// All ancestors are transitively present in local storage
    pub solid: bool,

    /// Past-cone checks passed; the message has been booked and may be a tip
    pub eligible: bool,

    /// Cumulative witness weight crossed the confirmation threshold
    pub confirmed: bool,

    /// Set exactly once, when `confirmed` flips true
    pub confirmation_time: Option<Instant>,

    /// Cumulative witness weight; always the sum of the supporters' mana
    pub weight: u64,

    /// Peers whose issued messages directly or transitively approve this one
    pub supporters: HashSet<PeerId>,

    /// Branch color inherited at booking time
    pub branch: Color,
}

impl MessageMetadata {
    /// Fresh metadata for a message that just arrived
    pub fn new(arrival_time: Instant) -> Self {
        Self {
            arrival_time,
            solid: false,
            eligible: false,
            confirmed: false,
            confirmation_time: None,
            weight: 0,
            supporters: HashSet::new(),
            branch: Color::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message(strong_parents: HashSet<MessageId>) -> Message {
        Message {
            id: MessageId::new(),
            strong_parents,
            weak_parents: HashSet::new(),
            issuer: 0,
            payload: Color::Undefined,
            issuance_time: Instant::now(),
            sequence_number: 1,
            height: 1,
        }
    }

    #[test]
    fn test_empty_parents_read_as_genesis() {
        let message = test_message(HashSet::new());
        let parents = message.effective_strong_parents();
        assert_eq!(parents.len(), 1);
        assert!(parents.contains(&MessageId::GENESIS));
    }

    #[test]
    fn test_explicit_parents_kept() {
        let parent = MessageId::new();
        let message = test_message([parent].into_iter().collect());
        assert_eq!(message.effective_strong_parents().len(), 1);
        assert!(message.effective_strong_parents().contains(&parent));
    }

    #[test]
    fn test_fresh_metadata_is_unbooked() {
        let metadata = MessageMetadata::new(Instant::now());
        assert!(!metadata.solid);
        assert!(!metadata.eligible);
        assert!(!metadata.confirmed);
        assert_eq!(metadata.weight, 0);
        assert!(metadata.supporters.is_empty());
    }
}
