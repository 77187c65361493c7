// src/tipmanager.rs

//! The frontier of messages eligible as parents, and tip selection.
//!
//! Tips are kept in one set per branch color, because a node extends the
//! branch matching its current opinion: an uncolored message attached to Red
//! tips inherits Red and carries its issuer's mana to that branch. Each set
//! holds a strong pool (the actual frontier) and a weak pool (messages of
//! *other* branches that can be referenced without endorsing them).

use crate::color::Color;
use crate::config::{TangleConfig, TipSelectorKind};
use crate::errors::{Result, TangleError};
use crate::events::Event;
use crate::message::Message;
use crate::storage::Storage;
use crate::types::MessageId;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Events emitted by [`TipManager`]
pub struct TipManagerEvents {
    /// A message flowed through the tip manager:
    /// (opinion, tip pool size, processed count, issued count)
    pub message_processed: Event<(Color, usize, u64, u64)>,
}

/// A tip and what the factory needs to know about it
#[derive(Clone, Debug)]
struct TipEntry {
    height: u32,
    since: Instant,
}

/// Strong and weak tip pools of one branch
#[derive(Default)]
struct TipSet {
    strong: HashMap<MessageId, TipEntry>,
    weak: HashMap<MessageId, TipEntry>,
}

/// Per-peer tip bookkeeping and selection
pub struct TipManager {
    config: TangleConfig,
    storage: Arc<Storage>,

    /// One tip set per branch color
    tip_sets: Mutex<HashMap<Color, TipSet>>,

    /// Processed messages per branch color
    processed: Mutex<HashMap<Color, u64>>,

    /// Event surface
    pub events: TipManagerEvents,
}

impl TipManager {
    /// Creates a tip manager with empty pools
    pub fn new(config: TangleConfig, storage: Arc<Storage>) -> Self {
        Self {
            config,
            storage,
            tip_sets: Mutex::new(HashMap::new()),
            processed: Mutex::new(HashMap::new()),
            events: TipManagerEvents {
                message_processed: Event::new(),
            },
        }
    }

    /// Routes a freshly booked message through the tip bookkeeping.
    ///
    /// The message replaces its strong parents in its branch's frontier and
    /// becomes a weak-reference candidate for every other branch.
    pub fn analyze_message(
        &self,
        message: &Message,
        branch: Color,
        opinion: Color,
        issued_count: u64,
    ) -> Result<()> {
        for parent in message.effective_strong_parents() {
            self.remove_tip(&parent)?;
        }
        for parent in &message.weak_parents {
            self.remove_weak_reference(parent)?;
        }
        self.add_tip(message, branch)?;

        let tip_pool_size = self.tip_pool_size(opinion)?;
        let processed_count = {
            let mut processed = self
                .processed
                .lock()
                .map_err(|e| TangleError::LockPoisoned(format!("processed: {}", e)))?;
            *processed.entry(branch).or_insert(0) += 1;
            *processed.get(&opinion).unwrap_or(&0)
        };

        self.events
            .message_processed
            .trigger(&(opinion, tip_pool_size, processed_count, issued_count));

        Ok(())
    }

    /// Inserts a message into its branch's strong pool and offers it as a
    /// weak reference to all other branches
    pub fn add_tip(&self, message: &Message, branch: Color) -> Result<()> {
        let entry = TipEntry {
            height: message.height,
            since: Instant::now(),
        };

        let mut sets = self
            .tip_sets
            .lock()
            .map_err(|e| TangleError::LockPoisoned(format!("tip sets: {}", e)))?;

        sets.entry(branch)
            .or_default()
            .strong
            .insert(message.id, entry.clone());

        for color in [Color::Undefined, Color::Red, Color::Green, Color::Blue] {
            if color != branch {
                sets.entry(color)
                    .or_default()
                    .weak
                    .insert(message.id, entry.clone());
            }
        }

        Ok(())
    }

    /// Removes a message from every pool; called for each strong parent of a
    /// newly processed message
    pub fn remove_tip(&self, id: &MessageId) -> Result<()> {
        let mut sets = self
            .tip_sets
            .lock()
            .map_err(|e| TangleError::LockPoisoned(format!("tip sets: {}", e)))?;

        for set in sets.values_mut() {
            set.strong.remove(id);
            set.weak.remove(id);
        }

        Ok(())
    }

    /// Removes a message from the weak pools only
    fn remove_weak_reference(&self, id: &MessageId) -> Result<()> {
        let mut sets = self
            .tip_sets
            .lock()
            .map_err(|e| TangleError::LockPoisoned(format!("tip sets: {}", e)))?;

        for set in sets.values_mut() {
            set.weak.remove(id);
        }

        Ok(())
    }

    /// Selects parents for a new message from the `opinion` branch.
    ///
    /// Returns up to `parents_count` strong parents via the configured TSA
    /// and `⌊parents_count · weak_tips_ratio⌋` weak parents. Fewer tips than
    /// requested yields them all; an empty pool yields `{Genesis}`.
    pub fn tips(&self, opinion: Color) -> Result<(HashSet<MessageId>, HashSet<MessageId>)> {
        let (strong_candidates, weak_candidates) = {
            let sets = self
                .tip_sets
                .lock()
                .map_err(|e| TangleError::LockPoisoned(format!("tip sets: {}", e)))?;

            match sets.get(&opinion) {
                Some(set) => (
                    set.strong
                        .iter()
                        .map(|(id, entry)| (*id, entry.clone()))
                        .collect::<Vec<_>>(),
                    set.weak.keys().copied().collect::<Vec<_>>(),
                ),
                None => (Vec::new(), Vec::new()),
            }
        };

        let strong = self.select_strong(strong_candidates)?;

        let mut weak = HashSet::new();
        let weak_count = self.config.weak_parents_count();
        if weak_count > 0 {
            let mut rng = rand::thread_rng();
            let eligible: Vec<MessageId> = weak_candidates
                .into_iter()
                .filter(|id| !strong.contains(id))
                .collect();
            weak = eligible
                .choose_multiple(&mut rng, weak_count)
                .copied()
                .collect();
        }

        Ok((strong, weak))
    }

    /// Applies the configured TSA to the strong pool
    fn select_strong(&self, candidates: Vec<(MessageId, TipEntry)>) -> Result<HashSet<MessageId>> {
        let k = self.config.parents_count;

        let eligible: Vec<(MessageId, TipEntry)> = match self.config.tsa {
            TipSelectorKind::DeltaUrts => {
                let delta = self.config.delta_urts();
                let now = Instant::now();
                candidates
                    .into_iter()
                    .filter(|(_, entry)| now.duration_since(entry.since) <= delta)
                    .collect()
            }
            _ => candidates,
        };

        if eligible.is_empty() {
            let mut genesis = HashSet::new();
            genesis.insert(MessageId::GENESIS);
            return Ok(genesis);
        }

        if eligible.len() <= k {
            return Ok(eligible.into_iter().map(|(id, _)| id).collect());
        }

        let mut rng = rand::thread_rng();
        let selected = match self.config.tsa {
            TipSelectorKind::WeightedUrts => self.select_weighted(&eligible, k, &mut rng)?,
            TipSelectorKind::Urts | TipSelectorKind::DeltaUrts => eligible
                .choose_multiple(&mut rng, k)
                .map(|(id, _)| *id)
                .collect(),
        };

        Ok(selected)
    }

    /// Samples `k` tips without replacement, biased by witness weight
    fn select_weighted<R: Rng>(
        &self,
        candidates: &[(MessageId, TipEntry)],
        k: usize,
        rng: &mut R,
    ) -> Result<HashSet<MessageId>> {
        let mut remaining: Vec<(MessageId, f64)> = Vec::with_capacity(candidates.len());
        for (id, _) in candidates {
            let weight = self
                .storage
                .metadata_snapshot(id)?
                .map(|metadata| metadata.weight)
                .unwrap_or(0);
            remaining.push((*id, 1.0 + weight as f64));
        }

        let mut selected = HashSet::new();
        while selected.len() < k && !remaining.is_empty() {
            let total: f64 = remaining.iter().map(|(_, w)| w).sum();
            let random_value: f64 = rng.gen_range(0.0..total);

            let mut cumulative = 0.0;
            let mut chosen = remaining.len() - 1;
            for (i, (_, weight)) in remaining.iter().enumerate() {
                cumulative += weight;
                if random_value <= cumulative {
                    chosen = i;
                    break;
                }
            }

            let (id, _) = remaining.swap_remove(chosen);
            selected.insert(id);
        }

        Ok(selected)
    }

    /// Height of a message currently tracked as a strong tip
    pub fn get_tip(&self, id: &MessageId) -> Option<u32> {
        let sets = self.tip_sets.lock().ok()?;
        sets.values()
            .find_map(|set| set.strong.get(id).map(|entry| entry.height))
    }

    /// Size of the strong pool of one branch
    pub fn tip_pool_size(&self, opinion: Color) -> Result<usize> {
        let sets = self
            .tip_sets
            .lock()
            .map_err(|e| TangleError::LockPoisoned(format!("tip sets: {}", e)))?;
        Ok(sets.get(&opinion).map(|set| set.strong.len()).unwrap_or(0))
    }
}
