// src/storage.rs

//! Content-addressed storage of messages and their metadata.
//!
//! One storage instance exists per peer. Messages are immutable once
//! inserted; every piece of mutable per-message state lives in the metadata
//! entry created alongside, guarded by its own lock so that weight
//! propagation and harness observers can touch different messages
//! concurrently. Storage never evicts.

use crate::errors::{Result, TangleError};
use crate::events::Event;
use crate::message::{Message, MessageMetadata};
use crate::types::MessageId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Outcome of a store attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// First time this message was seen
    Inserted,
    /// The message was already stored; nothing changed
    Duplicate,
}

/// Events emitted by [`Storage`]
pub struct StorageEvents {
    /// A message was inserted for the first time
    pub message_stored: Event<Message>,
}

/// Per-peer message store
pub struct Storage {
    /// Messages indexed by their identifier
    messages: RwLock<HashMap<MessageId, Message>>,

    /// Metadata handles, one lock per message
    metadata: RwLock<HashMap<MessageId, Arc<RwLock<MessageMetadata>>>>,

    /// Event surface
    pub events: StorageEvents,
}

impl Storage {
    /// Creates an empty storage holding only the genesis metadata.
    ///
    /// The genesis is seeded solid, eligible and confirmed: every node
    /// implicitly knows the DAG root, and confirmation monotonicity must
    /// hold from the first booked message onward.
    pub fn new() -> Self {
        let mut genesis = MessageMetadata::new(Instant::now());
        genesis.solid = true;
        genesis.eligible = true;
        genesis.confirmed = true;
        genesis.confirmation_time = Some(genesis.arrival_time);

        let mut metadata = HashMap::new();
        metadata.insert(MessageId::GENESIS, Arc::new(RwLock::new(genesis)));

        Self {
            messages: RwLock::new(HashMap::new()),
            metadata: RwLock::new(metadata),
            events: StorageEvents {
                message_stored: Event::new(),
            },
        }
    }

    /// Atomic insert-if-absent.
    ///
    /// Emits `MessageStored` on first insert; a duplicate store is an
    /// idempotent no-op.
    pub fn store(&self, message: Message) -> Result<StoreOutcome> {
        {
            let mut messages = self
                .messages
                .write()
                .map_err(|e| TangleError::LockPoisoned(format!("messages: {}", e)))?;

            if messages.contains_key(&message.id) {
                return Ok(StoreOutcome::Duplicate);
            }
            messages.insert(message.id, message.clone());
        }

        {
            let mut metadata = self
                .metadata
                .write()
                .map_err(|e| TangleError::LockPoisoned(format!("metadata: {}", e)))?;
            metadata.insert(
                message.id,
                Arc::new(RwLock::new(MessageMetadata::new(Instant::now()))),
            );
        }

        self.events.message_stored.trigger(&message);

        Ok(StoreOutcome::Inserted)
    }

    /// Retrieves a message by identifier
    pub fn message(&self, id: &MessageId) -> Result<Option<Message>> {
        let messages = self
            .messages
            .read()
            .map_err(|e| TangleError::LockPoisoned(format!("messages: {}", e)))?;

        Ok(messages.get(id).cloned())
    }

    /// Retrieves the metadata handle for a message
    pub fn metadata(&self, id: &MessageId) -> Result<Option<Arc<RwLock<MessageMetadata>>>> {
        let metadata = self
            .metadata
            .read()
            .map_err(|e| TangleError::LockPoisoned(format!("metadata: {}", e)))?;

        Ok(metadata.get(id).cloned())
    }

    /// Clones the current metadata state of a message
    pub fn metadata_snapshot(&self, id: &MessageId) -> Result<Option<MessageMetadata>> {
        match self.metadata(id)? {
            Some(handle) => {
                let guard = handle
                    .read()
                    .map_err(|e| TangleError::LockPoisoned(format!("metadata entry: {}", e)))?;
                Ok(Some(guard.clone()))
            }
            None => Ok(None),
        }
    }

    /// Runs `mutator` on the message's metadata under its per-message lock
    pub fn update_metadata<F>(&self, id: &MessageId, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut MessageMetadata),
    {
        let handle = self
            .metadata(id)?
            .ok_or_else(|| TangleError::MessageNotFound(format!("{}", id)))?;

        let mut guard = handle
            .write()
            .map_err(|e| TangleError::LockPoisoned(format!("metadata entry: {}", e)))?;
        mutator(&mut guard);

        Ok(())
    }

    /// Checks whether a message is stored (the genesis always is)
    pub fn contains(&self, id: &MessageId) -> Result<bool> {
        if id.is_genesis() {
            return Ok(true);
        }
        let messages = self
            .messages
            .read()
            .map_err(|e| TangleError::LockPoisoned(format!("messages: {}", e)))?;
        Ok(messages.contains_key(id))
    }

    /// Number of stored messages, genesis excluded
    pub fn message_count(&self) -> Result<usize> {
        let messages = self
            .messages
            .read()
            .map_err(|e| TangleError::LockPoisoned(format!("messages: {}", e)))?;
        Ok(messages.len())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_message() -> Message {
        Message {
            id: MessageId::new(),
            strong_parents: [MessageId::GENESIS].into_iter().collect(),
            weak_parents: HashSet::new(),
            issuer: 0,
            payload: Color::Undefined,
            issuance_time: Instant::now(),
            sequence_number: 1,
            height: 1,
        }
    }

    #[test]
    fn test_store_and_retrieve() {
        let storage = Storage::new();
        let message = test_message();
        let id = message.id;

        assert_eq!(storage.store(message).unwrap(), StoreOutcome::Inserted);
        assert!(storage.contains(&id).unwrap());
        assert_eq!(storage.message(&id).unwrap().unwrap().id, id);
        assert!(!storage.metadata_snapshot(&id).unwrap().unwrap().eligible);
    }

    #[test]
    fn test_duplicate_store_is_idempotent() {
        let storage = Storage::new();
        let stored = Arc::new(AtomicUsize::new(0));

        let counter = stored.clone();
        storage.events.message_stored.attach(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let message = test_message();
        assert_eq!(
            storage.store(message.clone()).unwrap(),
            StoreOutcome::Inserted
        );
        assert_eq!(storage.store(message).unwrap(), StoreOutcome::Duplicate);

        assert_eq!(stored.load(Ordering::SeqCst), 1);
        assert_eq!(storage.message_count().unwrap(), 1);
    }

    #[test]
    fn test_genesis_is_seeded_confirmed() {
        let storage = Storage::new();
        assert!(storage.contains(&MessageId::GENESIS).unwrap());

        let genesis = storage
            .metadata_snapshot(&MessageId::GENESIS)
            .unwrap()
            .unwrap();
        assert!(genesis.confirmed);
        assert!(genesis.eligible);
        assert_eq!(genesis.weight, 0);
    }

    #[test]
    fn test_update_metadata_under_lock() {
        let storage = Storage::new();
        let message = test_message();
        let id = message.id;
        storage.store(message).unwrap();

        storage
            .update_metadata(&id, |metadata| {
                metadata.weight = 42;
            })
            .unwrap();

        assert_eq!(storage.metadata_snapshot(&id).unwrap().unwrap().weight, 42);
    }

    #[test]
    fn test_update_metadata_unknown_message() {
        let storage = Storage::new();
        let result = storage.update_metadata(&MessageId::new(), |_| {});
        assert!(matches!(result, Err(TangleError::MessageNotFound(_))));
    }
}
