// src/opinionmanager.rs

//! Per-node opinion derived from branch approval weights.
//!
//! Every booked message whose inherited branch is colored counts as its
//! issuer's latest statement of support, ordered by sequence number. A peer
//! supports at most one color at a time; switching colors moves its mana
//! between branch weights. The node's own opinion is recomputed from the
//! branch weights on every move, through a pluggable strategy so that
//! adversary variants can deviate from the honest majority rule.

use crate::color::Color;
use crate::config::TangleConfig;
use crate::errors::{Result, TangleError};
use crate::events::Event;
use crate::message::Message;
use crate::substrate::NetworkSubstrate;
use crate::types::PeerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Derives a node's opinion from the current branch weights.
///
/// The honest rule is the majority; adversaries substitute their own.
pub trait OpinionStrategy: Send + Sync {
    /// Picks the opinion given the branch weights and the current opinion
    fn derive(&self, weights: &HashMap<Color, i64>, current: Color) -> Color;
}

/// Honest strategy: the heaviest branch wins, ties broken by the fixed
/// color order (Red > Green > Blue).
pub struct MajorityStrategy;

impl OpinionStrategy for MajorityStrategy {
    fn derive(&self, weights: &HashMap<Color, i64>, _current: Color) -> Color {
        let mut best = Color::Undefined;
        let mut best_weight = 0;
        for color in Color::CONFLICT_COLORS {
            let weight = *weights.get(&color).unwrap_or(&0);
            if weight > best_weight {
                best = color;
                best_weight = weight;
            }
        }
        best
    }
}

/// Events emitted by [`OpinionManager`]
pub struct OpinionManagerEvents {
    /// The node flipped its opinion: (old, new, own mana)
    pub opinion_changed: Event<(Color, Color, i64)>,

    /// A branch's approval weight moved: (color, delta)
    pub approval_weight_updated: Event<(Color, i64)>,

    /// A branch crossed the confirmation threshold upward: (color, weight)
    pub color_confirmed: Event<(Color, i64)>,

    /// A confirmed branch fell back below the threshold:
    /// (color, lost support, weight)
    pub color_unconfirmed: Event<(Color, i64, i64)>,

    /// The confirmed branch recorded a new weight minimum: (color, weight)
    pub min_confirmed_weight_updated: Event<(Color, i64)>,
}

/// A peer's latest colored statement
#[derive(Clone, Debug)]
struct PeerOpinion {
    color: Color,
    sequence_number: u64,
}

#[derive(Default)]
struct OpinionState {
    opinion: Color,
    confirmed: Option<Color>,
    min_confirmed_weight: i64,
    peer_opinions: HashMap<PeerId, PeerOpinion>,
    weights: HashMap<Color, i64>,
}

/// Deferred event, fired after the state lock is released
enum Fired {
    OpinionChanged(Color, Color, i64),
    WeightUpdated(Color, i64),
    Confirmed(Color, i64),
    Unconfirmed(Color, i64, i64),
    MinUpdated(Color, i64),
}

/// Tracks branch weights and the node's resulting opinion
pub struct OpinionManager {
    peer_id: PeerId,
    config: TangleConfig,
    substrate: Arc<dyn NetworkSubstrate>,
    strategy: Box<dyn OpinionStrategy>,
    state: Mutex<OpinionState>,

    /// Event surface
    pub events: OpinionManagerEvents,
}

impl OpinionManager {
    /// Creates an opinion manager for the given peer
    pub fn new(
        peer_id: PeerId,
        config: TangleConfig,
        substrate: Arc<dyn NetworkSubstrate>,
        strategy: Box<dyn OpinionStrategy>,
    ) -> Self {
        Self {
            peer_id,
            config,
            substrate,
            strategy,
            state: Mutex::new(OpinionState::default()),
            events: OpinionManagerEvents {
                opinion_changed: Event::new(),
                approval_weight_updated: Event::new(),
                color_confirmed: Event::new(),
                color_unconfirmed: Event::new(),
                min_confirmed_weight_updated: Event::new(),
            },
        }
    }

    /// Accounts a booked message with its inherited branch color.
    ///
    /// Uncolored messages carry no statement. Stale messages (sequence
    /// number at or below the issuer's last seen) are ignored, so delivery
    /// order across neighbors cannot double-count.
    pub fn process_message(&self, message: &Message, branch: Color) -> Result<()> {
        if branch == Color::Undefined {
            return Ok(());
        }

        let mana = self.substrate.weight(message.issuer) as i64;
        let mut fired = Vec::new();

        {
            let mut state = self
                .state
                .lock()
                .map_err(|e| TangleError::LockPoisoned(format!("opinion state: {}", e)))?;

            let previous = state.peer_opinions.get(&message.issuer).cloned();
            if let Some(previous) = &previous {
                if message.sequence_number <= previous.sequence_number {
                    return Ok(());
                }
            }

            state.peer_opinions.insert(
                message.issuer,
                PeerOpinion {
                    color: branch,
                    sequence_number: message.sequence_number,
                },
            );

            let moved = match previous {
                Some(previous) if previous.color == branch => false,
                Some(previous) => {
                    *state.weights.entry(previous.color).or_insert(0) -= mana;
                    *state.weights.entry(branch).or_insert(0) += mana;
                    fired.push(Fired::WeightUpdated(previous.color, -mana));
                    fired.push(Fired::WeightUpdated(branch, mana));
                    true
                }
                None => {
                    *state.weights.entry(branch).or_insert(0) += mana;
                    fired.push(Fired::WeightUpdated(branch, mana));
                    true
                }
            };

            if moved {
                self.refresh_locked(&mut state, &mut fired, mana);
            }
        }

        self.fire(fired);
        Ok(())
    }

    /// Re-derives the opinion from the current weights.
    ///
    /// Used by adversary variants after their assigned color changes.
    pub fn update_opinion(&self) -> Result<()> {
        let mut fired = Vec::new();
        {
            let mut state = self
                .state
                .lock()
                .map_err(|e| TangleError::LockPoisoned(format!("opinion state: {}", e)))?;
            self.refresh_locked(&mut state, &mut fired, 0);
        }
        self.fire(fired);
        Ok(())
    }

    /// Recomputes opinion and confirmation state; the caller holds the lock.
    fn refresh_locked(&self, state: &mut OpinionState, fired: &mut Vec<Fired>, moved_mana: i64) {
        let derived = self.strategy.derive(&state.weights, state.opinion);
        if derived != state.opinion {
            let old = state.opinion;
            state.opinion = derived;

            // the first selection out of Undefined is not a flip
            if old != Color::Undefined {
                let own_mana = self.substrate.weight(self.peer_id) as i64;
                fired.push(Fired::OpinionChanged(old, derived, own_mana));
            }
        }

        let total_mana = self.substrate.total_weight();

        if let Some(confirmed) = state.confirmed {
            let weight = *state.weights.get(&confirmed).unwrap_or(&0);
            if !self.config.weight_confirmed(weight.max(0) as u64, total_mana) {
                state.confirmed = None;
                state.min_confirmed_weight = 0;
                fired.push(Fired::Unconfirmed(confirmed, moved_mana, weight));
            } else if weight < state.min_confirmed_weight {
                state.min_confirmed_weight = weight;
                fired.push(Fired::MinUpdated(confirmed, weight));
            }
        }

        if state.confirmed.is_none() && state.opinion != Color::Undefined {
            let weight = *state.weights.get(&state.opinion).unwrap_or(&0);
            if self.config.weight_confirmed(weight.max(0) as u64, total_mana) {
                state.confirmed = Some(state.opinion);
                state.min_confirmed_weight = weight;
                fired.push(Fired::Confirmed(state.opinion, weight));
                fired.push(Fired::MinUpdated(state.opinion, weight));
            }
        }
    }

    fn fire(&self, fired: Vec<Fired>) {
        for event in fired {
            match event {
                Fired::OpinionChanged(old, new, mana) => {
                    self.events.opinion_changed.trigger(&(old, new, mana))
                }
                Fired::WeightUpdated(color, delta) => {
                    self.events.approval_weight_updated.trigger(&(color, delta))
                }
                Fired::Confirmed(color, weight) => {
                    self.events.color_confirmed.trigger(&(color, weight))
                }
                Fired::Unconfirmed(color, lost, weight) => self
                    .events
                    .color_unconfirmed
                    .trigger(&(color, lost, weight)),
                Fired::MinUpdated(color, weight) => self
                    .events
                    .min_confirmed_weight_updated
                    .trigger(&(color, weight)),
            }
        }
    }

    /// The node's current opinion
    pub fn opinion(&self) -> Color {
        self.state
            .lock()
            .map(|state| state.opinion)
            .unwrap_or(Color::Undefined)
    }

    /// The currently confirmed color, if any
    pub fn confirmed_color(&self) -> Option<Color> {
        self.state.lock().map(|state| state.confirmed).unwrap_or(None)
    }

    /// Approval weight of one branch
    pub fn branch_weight(&self, color: Color) -> i64 {
        self.state
            .lock()
            .map(|state| *state.weights.get(&color).unwrap_or(&0))
            .unwrap_or(0)
    }

    /// Snapshot of all branch weights
    pub fn branch_weights(&self) -> HashMap<Color, i64> {
        self.state
            .lock()
            .map(|state| state.weights.clone())
            .unwrap_or_default()
    }

    /// Lowest weight observed for the confirmed branch since it confirmed
    pub fn min_confirmed_weight(&self) -> i64 {
        self.state
            .lock()
            .map(|state| state.min_confirmed_weight)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubSubstrate;
    use crate::types::MessageId;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn colored_message(issuer: PeerId, sequence_number: u64, payload: Color) -> Message {
        Message {
            id: MessageId::new(),
            strong_parents: [MessageId::GENESIS].into_iter().collect(),
            weak_parents: HashSet::new(),
            issuer,
            payload,
            issuance_time: Instant::now(),
            sequence_number,
            height: 1,
        }
    }

    fn manager(weights: Vec<u64>, threshold: f64) -> OpinionManager {
        let config = TangleConfig {
            confirmation_threshold: threshold,
            ..Default::default()
        };
        OpinionManager::new(
            0,
            config,
            StubSubstrate::shared(weights),
            Box::new(MajorityStrategy),
        )
    }

    #[test]
    fn test_opinion_follows_majority() {
        let manager = manager(vec![50, 30, 20], 0.67);

        let red = colored_message(0, 1, Color::Red);
        manager.process_message(&red, Color::Red).unwrap();
        assert_eq!(manager.opinion(), Color::Red);

        let blue = colored_message(1, 1, Color::Blue);
        manager.process_message(&blue, Color::Blue).unwrap();
        assert_eq!(manager.opinion(), Color::Red);

        assert_eq!(manager.branch_weight(Color::Red), 50);
        assert_eq!(manager.branch_weight(Color::Blue), 30);
    }

    #[test]
    fn test_switching_color_transfers_mana() {
        let manager = manager(vec![60, 40], 0.9);

        manager
            .process_message(&colored_message(1, 1, Color::Red), Color::Red)
            .unwrap();
        assert_eq!(manager.branch_weight(Color::Red), 40);

        manager
            .process_message(&colored_message(1, 2, Color::Blue), Color::Blue)
            .unwrap();
        assert_eq!(manager.branch_weight(Color::Red), 0);
        assert_eq!(manager.branch_weight(Color::Blue), 40);

        let total: i64 = manager.branch_weights().values().sum();
        assert!(total <= 100);
    }

    #[test]
    fn test_stale_sequence_numbers_are_ignored() {
        let manager = manager(vec![60, 40], 0.9);

        manager
            .process_message(&colored_message(1, 5, Color::Red), Color::Red)
            .unwrap();
        manager
            .process_message(&colored_message(1, 3, Color::Blue), Color::Blue)
            .unwrap();

        assert_eq!(manager.branch_weight(Color::Red), 40);
        assert_eq!(manager.branch_weight(Color::Blue), 0);
    }

    #[test]
    fn test_flip_counting_skips_first_selection() {
        let manager = manager(vec![40, 45, 50], 2.0);

        let flips = Arc::new(AtomicUsize::new(0));
        let counter = flips.clone();
        manager.events.opinion_changed.attach(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Red reaches 40, then Blue 45, then Green 50
        manager
            .process_message(&colored_message(0, 1, Color::Red), Color::Red)
            .unwrap();
        manager
            .process_message(&colored_message(1, 1, Color::Blue), Color::Blue)
            .unwrap();
        manager
            .process_message(&colored_message(2, 1, Color::Green), Color::Green)
            .unwrap();

        assert_eq!(manager.opinion(), Color::Green);
        assert_eq!(flips.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_color_confirmation_and_unconfirmation() {
        let manager = manager(vec![60, 40], 0.5);

        let confirmed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let unconfirmed = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let sink = confirmed.clone();
            manager.events.color_confirmed.attach(move |(color, weight)| {
                sink.lock().unwrap().push((*color, *weight));
            });
        }
        {
            let sink = unconfirmed.clone();
            manager
                .events
                .color_unconfirmed
                .attach(move |(color, lost, weight)| {
                    sink.lock().unwrap().push((*color, *lost, *weight));
                });
        }

        manager
            .process_message(&colored_message(0, 1, Color::Red), Color::Red)
            .unwrap();
        assert_eq!(*confirmed.lock().unwrap(), vec![(Color::Red, 60)]);
        assert_eq!(manager.confirmed_color(), Some(Color::Red));
        assert_eq!(manager.min_confirmed_weight(), 60);

        // the heavy peer walks away; Red unconfirms and Blue takes its place
        manager
            .process_message(&colored_message(0, 2, Color::Blue), Color::Blue)
            .unwrap();
        assert_eq!(*unconfirmed.lock().unwrap(), vec![(Color::Red, 60, 0)]);
        assert_eq!(
            *confirmed.lock().unwrap(),
            vec![(Color::Red, 60), (Color::Blue, 60)]
        );
        assert_eq!(manager.confirmed_color(), Some(Color::Blue));
    }

    #[test]
    fn test_opinion_is_pure_function_of_weights() {
        let strategy = MajorityStrategy;
        let mut weights = HashMap::new();
        weights.insert(Color::Red, 30);
        weights.insert(Color::Blue, 30);

        // ties break toward the fixed color order, deterministically
        assert_eq!(strategy.derive(&weights, Color::Undefined), Color::Red);
        assert_eq!(strategy.derive(&weights, Color::Blue), Color::Red);

        weights.insert(Color::Blue, 31);
        assert_eq!(strategy.derive(&weights, Color::Red), Color::Blue);
    }
}
