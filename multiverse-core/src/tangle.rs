// src/tangle.rs

//! Per-node composition of the tangle engine.
//!
//! The tangle owns every component and routes incoming gossip through the
//! processing pipeline: store, solidify, book (weight propagation and
//! opinion update), tip update, gossip, and waking of children that were
//! parked on missing parents. A message reaches the booking stages exactly
//! once; duplicates abort at the store stage.

use crate::approvalmanager::ApprovalManager;
use crate::color::Color;
use crate::config::TangleConfig;
use crate::errors::{Result, TangleError};
use crate::message::Message;
use crate::messagefactory::MessageFactory;
use crate::opinionmanager::{MajorityStrategy, OpinionManager, OpinionStrategy};
use crate::requester::Requester;
use crate::storage::{Storage, StoreOutcome};
use crate::substrate::{NetworkSubstrate, Packet};
use crate::tipmanager::TipManager;
use crate::types::{MessageId, PeerId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// The per-node tangle: DAG state plus the engine driving it
pub struct Tangle {
    peer_id: PeerId,
    config: TangleConfig,

    /// Message and metadata store
    pub storage: Arc<Storage>,

    /// Missing-message recovery
    pub requester: Arc<Requester>,

    /// Tip bookkeeping and selection
    pub tip_manager: Arc<TipManager>,

    /// Message composition
    pub message_factory: Arc<MessageFactory>,

    /// Witness-weight propagation
    pub approval_manager: Arc<ApprovalManager>,

    /// Branch weights and opinion
    pub opinion_manager: Arc<OpinionManager>,

    substrate: Arc<dyn NetworkSubstrate>,

    /// Whether received messages are forwarded to the neighbors
    relay: bool,

    /// Children waiting for a parent, keyed by the awaited parent
    pending: Mutex<HashMap<MessageId, Vec<(MessageId, Option<PeerId>)>>>,
}

impl Tangle {
    /// Creates an honest tangle
    pub fn new(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
    ) -> Self {
        Self::with_options(peer_id, config, substrate, Box::new(MajorityStrategy), true)
    }

    /// Creates a tangle with a custom opinion strategy and relay behavior;
    /// adversary variants build on this
    pub fn with_options(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
        strategy: Box<dyn OpinionStrategy>,
        relay: bool,
    ) -> Self {
        let storage = Arc::new(Storage::new());
        let requester = Arc::new(Requester::new());
        let tip_manager = Arc::new(TipManager::new(config.clone(), storage.clone()));
        let opinion_manager = Arc::new(OpinionManager::new(
            peer_id,
            config.clone(),
            substrate.clone(),
            strategy,
        ));
        let approval_manager = Arc::new(ApprovalManager::new(
            config.clone(),
            storage.clone(),
            substrate.clone(),
        ));
        let message_factory = Arc::new(MessageFactory::new(
            peer_id,
            storage.clone(),
            tip_manager.clone(),
            opinion_manager.clone(),
        ));

        // missing messages are asked from every neighbor
        {
            let substrate = substrate.clone();
            requester.events.request.attach(move |id| {
                for neighbor in substrate.neighbors(peer_id) {
                    substrate.send(peer_id, neighbor, Packet::Request(*id));
                }
            });
        }

        Self {
            peer_id,
            config,
            storage,
            requester,
            tip_manager,
            message_factory,
            approval_manager,
            opinion_manager,
            substrate,
            relay,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The peer owning this tangle
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The tangle's configuration
    pub fn config(&self) -> &TangleConfig {
        &self.config
    }

    /// Mints a new message with the given payload, processes it locally and
    /// broadcasts it to all neighbors
    pub fn issue_message(&self, payload: Color) -> Result<Message> {
        let message = self.message_factory.create_message(payload)?;
        self.process_message(message.clone(), None)?;
        Ok(message)
    }

    /// Entry point of the processing pipeline.
    ///
    /// `from` is the neighbor the message arrived from, or `None` for
    /// self-issued messages.
    pub fn process_message(&self, message: Message, from: Option<PeerId>) -> Result<()> {
        let id = message.id;

        if let StoreOutcome::Duplicate = self.storage.store(message)? {
            return Ok(());
        }
        self.requester.stop_request(&id);

        // Drive this message, and everything it unblocks, to completion.
        // Entries are (message, origin, woken): a woken child that is still
        // missing a parent stays parked under the remaining ones.
        let mut queue = VecDeque::new();
        queue.push_back((id, from, false));

        while let Some((current, via, woken)) = queue.pop_front() {
            let metadata = self
                .storage
                .metadata_snapshot(&current)?
                .ok_or_else(|| TangleError::MessageNotFound(format!("{}", current)))?;
            if metadata.eligible {
                continue;
            }

            let message = self
                .storage
                .message(&current)?
                .ok_or_else(|| TangleError::MessageNotFound(format!("{}", current)))?;

            let missing = self.unsatisfied_parents(&message)?;
            if missing.is_empty() {
                self.book(&message)?;
                self.gossip(&message, via);

                let children = self
                    .pending
                    .lock()
                    .map_err(|e| TangleError::LockPoisoned(format!("pending: {}", e)))?
                    .remove(&current);
                if let Some(children) = children {
                    for (child, child_via) in children {
                        queue.push_back((child, child_via, true));
                    }
                }
            } else if !woken {
                // Park before requesting: a substrate may answer a request
                // synchronously, and the answer's wake-up must find the
                // parked child.
                {
                    let mut pending = self
                        .pending
                        .lock()
                        .map_err(|e| TangleError::LockPoisoned(format!("pending: {}", e)))?;
                    for parent in &missing {
                        pending.entry(*parent).or_default().push((current, via));
                    }
                }
                for parent in missing {
                    if !self.storage.contains(&parent)? {
                        self.requester.start_request(parent);
                    }
                }
            }
        }

        Ok(())
    }

    /// Parents that are not yet booked locally (the genesis always is)
    fn unsatisfied_parents(&self, message: &Message) -> Result<Vec<MessageId>> {
        let mut missing = Vec::new();
        for parent in message.all_parents() {
            if parent.is_genesis() {
                continue;
            }
            let booked = match self.storage.metadata_snapshot(parent)? {
                Some(metadata) => metadata.eligible,
                None => false,
            };
            if !booked {
                missing.push(*parent);
            }
        }
        Ok(missing)
    }

    /// Booking stages: branch inheritance, height check, weight propagation,
    /// opinion update, tip update
    fn book(&self, message: &Message) -> Result<()> {
        let branch = if message.payload != Color::Undefined {
            message.payload
        } else {
            self.inherited_branch(message)?
        };

        let expected_height = self.expected_height(message)?;
        if message.height != expected_height {
            panic!(
                "height invariant violated for {}: parents imply {}, message carries {}",
                message.id, expected_height, message.height
            );
        }

        self.storage.update_metadata(&message.id, |metadata| {
            metadata.solid = true;
            metadata.branch = branch;
        })?;

        self.approval_manager.book_message(message)?;
        self.opinion_manager.process_message(message, branch)?;

        let opinion = self.opinion_manager.opinion();
        self.tip_manager.analyze_message(
            message,
            branch,
            opinion,
            self.message_factory.issued_count(),
        )?;

        self.storage.update_metadata(&message.id, |metadata| {
            metadata.eligible = true;
        })?;

        Ok(())
    }

    /// Branch of an uncolored message: the branch of its strong parents.
    ///
    /// Conflicting parent branches resolve to the heaviest one, ties by the
    /// fixed color order.
    fn inherited_branch(&self, message: &Message) -> Result<Color> {
        let mut inherited = Color::Undefined;
        let mut inherited_weight = i64::MIN;

        for parent in message.effective_strong_parents() {
            let parent_branch = match self.storage.metadata_snapshot(&parent)? {
                Some(metadata) => metadata.branch,
                None => Color::Undefined,
            };
            if parent_branch == Color::Undefined {
                continue;
            }

            let weight = self.opinion_manager.branch_weight(parent_branch);
            let heavier = weight > inherited_weight
                || (weight == inherited_weight && parent_branch.rank() > inherited.rank());
            if heavier {
                inherited = parent_branch;
                inherited_weight = weight;
            }
        }

        Ok(inherited)
    }

    /// Height the strong parents imply for this message
    fn expected_height(&self, message: &Message) -> Result<u32> {
        let mut max_parent_height = 0;
        for parent in message.effective_strong_parents() {
            if parent.is_genesis() {
                continue;
            }
            let parent_message = self.storage.message(&parent)?.ok_or_else(|| {
                TangleError::MessageNotFound(format!("parent {} at booking", parent))
            })?;
            max_parent_height = max_parent_height.max(parent_message.height);
        }
        Ok(max_parent_height + 1)
    }

    /// Forwarding stage: own messages go to every neighbor, received ones to
    /// every neighbor except the sender (unless relaying is disabled)
    fn gossip(&self, message: &Message, via: Option<PeerId>) {
        match via {
            None => {
                for neighbor in self.substrate.neighbors(self.peer_id) {
                    self.substrate
                        .send(self.peer_id, neighbor, Packet::Message(message.clone()));
                }
            }
            Some(sender) if self.relay => {
                for neighbor in self.substrate.neighbors(self.peer_id) {
                    if neighbor != sender {
                        self.substrate
                            .send(self.peer_id, neighbor, Packet::Message(message.clone()));
                    }
                }
            }
            Some(_) => {}
        }
    }
}
