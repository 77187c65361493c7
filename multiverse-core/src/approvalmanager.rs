// src/approvalmanager.rs

//! Witness-weight propagation and message confirmation.
//!
//! Booking a message makes its issuer a supporter of every ancestor in the
//! strong past cone. A peer's support is the union of the past cones of all
//! its messages, so the walk can stop as soon as it reaches an ancestor the
//! issuer already supports. Weight only ever grows, and each peer's mana is
//! counted at most once per message.

use crate::config::TangleConfig;
use crate::errors::{Result, TangleError};
use crate::events::Event;
use crate::message::{Message, MessageMetadata};
use crate::storage::Storage;
use crate::substrate::NetworkSubstrate;
use crate::types::MessageId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Events emitted by [`ApprovalManager`]
pub struct ApprovalManagerEvents {
    /// A message's cumulative witness weight crossed the confirmation
    /// threshold: (message, metadata snapshot, weight, created-message count)
    pub message_confirmed: Event<(Message, MessageMetadata, u64, i64)>,

    /// A message's witness weight changed: (message, new weight)
    pub message_witness_weight_updated: Event<(Message, u64)>,
}

/// Propagates approval weight along the strong past cone
pub struct ApprovalManager {
    config: TangleConfig,
    storage: Arc<Storage>,
    substrate: Arc<dyn NetworkSubstrate>,

    /// Event surface
    pub events: ApprovalManagerEvents,
}

impl ApprovalManager {
    /// Creates an approval manager over the given storage
    pub fn new(
        config: TangleConfig,
        storage: Arc<Storage>,
        substrate: Arc<dyn NetworkSubstrate>,
    ) -> Self {
        Self {
            config,
            storage,
            substrate,
            events: ApprovalManagerEvents {
                message_confirmed: Event::new(),
                message_witness_weight_updated: Event::new(),
            },
        }
    }

    /// Adds the message's issuer as a supporter of the message and of every
    /// strong ancestor, confirming those that cross the threshold.
    ///
    /// The walk stops at the genesis and prunes at ancestors the issuer
    /// already supports; duplicate bookings are therefore no-ops.
    pub fn book_message(&self, message: &Message) -> Result<()> {
        let issuer = message.issuer;
        let mana = self.substrate.weight(issuer);
        let total_mana = self.substrate.total_weight();

        let mut queue = VecDeque::new();
        queue.push_back(message.id);

        while let Some(current) = queue.pop_front() {
            if current.is_genesis() {
                continue;
            }

            let handle = self.storage.metadata(&current)?.ok_or_else(|| {
                TangleError::MessageNotFound(format!("metadata of booked ancestor {}", current))
            })?;

            let update = {
                let mut metadata = handle
                    .write()
                    .map_err(|e| TangleError::LockPoisoned(format!("metadata entry: {}", e)))?;

                if metadata.supporters.contains(&issuer) {
                    None
                } else {
                    metadata.supporters.insert(issuer);
                    metadata.weight += mana;

                    let crossed = !metadata.confirmed
                        && self.config.weight_confirmed(metadata.weight, total_mana);
                    if crossed {
                        metadata.confirmed = true;
                        metadata.confirmation_time = Some(Instant::now());
                    }

                    Some((metadata.weight, crossed, metadata.clone()))
                }
            };

            let (weight, crossed, snapshot) = match update {
                Some(update) => update,
                None => continue,
            };

            let current_message = self.storage.message(&current)?.ok_or_else(|| {
                TangleError::MessageNotFound(format!("booked ancestor {}", current))
            })?;

            self.events
                .message_witness_weight_updated
                .trigger(&(current_message.clone(), weight));

            if crossed {
                self.events.message_confirmed.trigger(&(
                    current_message.clone(),
                    snapshot,
                    weight,
                    MessageId::created_count() as i64,
                ));
            }

            queue.extend(current_message.effective_strong_parents());
        }

        Ok(())
    }
}
