// src/messagefactory.rs

//! Composition of new messages.

use crate::color::Color;
use crate::errors::{Result, TangleError};
use crate::message::Message;
use crate::opinionmanager::OpinionManager;
use crate::storage::Storage;
use crate::tipmanager::TipManager;
use crate::types::{MessageId, PeerId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Builds the messages a node issues.
///
/// Selecting parents and stamping the sequence number are the only side
/// effects; storing and gossiping the result is the tangle's job.
pub struct MessageFactory {
    peer_id: PeerId,
    sequence_number: AtomicU64,
    storage: Arc<Storage>,
    tip_manager: Arc<TipManager>,
    opinion_manager: Arc<OpinionManager>,
}

impl MessageFactory {
    /// Creates a factory for the given issuer
    pub fn new(
        peer_id: PeerId,
        storage: Arc<Storage>,
        tip_manager: Arc<TipManager>,
        opinion_manager: Arc<OpinionManager>,
    ) -> Self {
        Self {
            peer_id,
            sequence_number: AtomicU64::new(0),
            storage,
            tip_manager,
            opinion_manager,
        }
    }

    /// Composes a new message with the given payload color.
    ///
    /// Parents come from the tip set of the node's current opinion, and the
    /// height is one greater than the maximum height among the strong
    /// parents (the genesis counts as height 0).
    pub fn create_message(&self, payload: Color) -> Result<Message> {
        let opinion = self.opinion_manager.opinion();
        let (strong_parents, weak_parents) = self.tip_manager.tips(opinion)?;

        let mut max_parent_height = 0;
        for parent in &strong_parents {
            max_parent_height = max_parent_height.max(self.parent_height(parent)?);
        }

        Ok(Message {
            id: MessageId::new(),
            strong_parents,
            weak_parents,
            issuer: self.peer_id,
            payload,
            issuance_time: Instant::now(),
            sequence_number: self.sequence_number.fetch_add(1, Ordering::SeqCst) + 1,
            height: max_parent_height + 1,
        })
    }

    /// Number of messages issued by this node so far
    pub fn issued_count(&self) -> u64 {
        self.sequence_number.load(Ordering::SeqCst)
    }

    fn parent_height(&self, id: &MessageId) -> Result<u32> {
        if id.is_genesis() {
            return Ok(0);
        }
        self.storage
            .message(id)?
            .map(|message| message.height)
            .ok_or_else(|| TangleError::MessageNotFound(format!("parent {}", id)))
    }
}
