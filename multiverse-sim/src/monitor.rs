// src/monitor.rs

//! Consensus monitoring.
//!
//! The monitor attaches observers to the event surface of every peer and
//! keeps aggregate counters: which colors are liked and confirmed, how much
//! mana stands behind them, how often the network-wide most-liked color
//! flipped, and how deep once-confirmed colors fell. Opinions themselves are
//! polled at every tick, because the first selection of a color is silent on
//! the event surface.

use crate::config::SimConfig;
use multiverse_core::{Color, NodeInterface};
use multiverse_network::Network;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace};

/// Counters keyed by name and color
pub struct ColorCounters {
    inner: Mutex<HashMap<String, HashMap<Color, i64>>>,
}

impl ColorCounters {
    /// Creates an empty counter table
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `delta` to a counter
    pub fn add(&self, name: &str, color: Color, delta: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner
                .entry(name.to_string())
                .or_default()
                .entry(color)
                .or_insert(0) += delta;
        }
    }

    /// Overwrites a counter
    pub fn set(&self, name: &str, color: Color, value: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .entry(name.to_string())
                .or_default()
                .insert(color, value);
        }
    }

    /// Reads a counter (0 when never written)
    pub fn get(&self, name: &str, color: Color) -> i64 {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.get(name).and_then(|counters| counters.get(&color).copied()))
            .unwrap_or(0)
    }
}

impl Default for ColorCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Scalar counters keyed by name
pub struct AtomicCounters {
    inner: Mutex<HashMap<String, i64>>,
}

impl AtomicCounters {
    /// Creates an empty counter table
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `delta` to a counter
    pub fn add(&self, name: &str, delta: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.entry(name.to_string()).or_insert(0) += delta;
        }
    }

    /// Overwrites a counter
    pub fn set(&self, name: &str, value: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(name.to_string(), value);
        }
    }

    /// Reads a counter (0 when never written)
    pub fn get(&self, name: &str) -> i64 {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.get(name).copied())
            .unwrap_or(0)
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-node record of confirmation robustness
#[derive(Clone, Copy, Debug)]
struct NodeRecord {
    min_confirmed_weight: i64,
    unconfirmation_count: i64,
}

/// Aggregated view over the whole network
pub struct Monitor {
    total_weight: u64,

    /// Per-color counters
    pub colors: ColorCounters,

    /// Scalar counters
    pub atomics: AtomicCounters,

    node_records: Vec<Mutex<NodeRecord>>,
    most_liked: Mutex<Color>,
    honest_most_liked: Mutex<Color>,
}

/// Picks the most-liked color from per-color counts, ties broken by the
/// fixed color order; Undefined while no color is liked at all
fn most_liked(red: i64, green: i64, blue: i64) -> Color {
    let mut best = Color::Undefined;
    let mut best_count = 0;
    for (color, count) in [
        (Color::Red, red),
        (Color::Green, green),
        (Color::Blue, blue),
    ] {
        if count > best_count {
            best = color;
            best_count = count;
        }
    }
    best
}

/// Updates the tracked most-liked color; returns whether this was a flip.
/// The first selection out of Undefined does not count.
pub(crate) fn most_liked_color_changed(
    red: i64,
    green: i64,
    blue: i64,
    current: &mut Color,
) -> bool {
    let candidate = most_liked(red, green, blue);
    if candidate == *current {
        return false;
    }

    let first_selection = *current == Color::Undefined;
    *current = candidate;
    !first_selection && candidate != Color::Undefined
}

impl Monitor {
    /// Creates a monitor for a network of `node_count` peers
    pub fn new(node_count: usize, total_weight: u64) -> Self {
        let node_records = (0..node_count)
            .map(|_| {
                Mutex::new(NodeRecord {
                    min_confirmed_weight: total_weight as i64,
                    unconfirmation_count: 0,
                })
            })
            .collect();

        Self {
            total_weight,
            colors: ColorCounters::new(),
            atomics: AtomicCounters::new(),
            node_records,
            most_liked: Mutex::new(Color::Undefined),
            honest_most_liked: Mutex::new(Color::Undefined),
        }
    }

    /// Attaches observers to every peer's event surface
    pub fn attach(self: &Arc<Self>, config: &SimConfig, network: &Network) {
        for peer in network.peers() {
            let id = peer.id;
            let mana = network.weight(id) as i64;
            let adversary = network.is_adversary(id);
            let events = &peer.node().tangle().opinion_manager.events;

            {
                let monitor = self.clone();
                events.color_confirmed.attach(move |(color, _weight)| {
                    monitor.colors.add("confirmedNodes", *color, 1);
                    monitor.colors.add("confirmedAccumulatedWeight", *color, mana);
                    if adversary {
                        monitor.colors.add("adversaryConfirmedNodes", *color, 1);
                        monitor
                            .colors
                            .add("adversaryConfirmedAccumulatedWeight", *color, mana);
                    }
                });
            }

            {
                let monitor = self.clone();
                events
                    .color_unconfirmed
                    .attach(move |(color, _lost, weight)| {
                        monitor.colors.add("colorUnconfirmed", *color, 1);
                        monitor.colors.add("confirmedNodes", *color, -1);
                        monitor
                            .colors
                            .add("confirmedAccumulatedWeight", *color, -mana);
                        monitor.colors.add("unconfirmedAccumulatedWeight", *color, mana);

                        if let Some(record) = monitor.node_records.get(id) {
                            if let Ok(mut record) = record.lock() {
                                record.unconfirmation_count += 1;
                                // a later confirmation starts tracking afresh
                                record.min_confirmed_weight = monitor.total_weight as i64;
                            }
                        }
                        debug!(peer = id, color = %color, weight, "color unconfirmed");
                    });
            }

            {
                let monitor = self.clone();
                events
                    .min_confirmed_weight_updated
                    .attach(move |(_color, weight)| {
                        if let Some(record) = monitor.node_records.get(id) {
                            if let Ok(mut record) = record.lock() {
                                if *weight < record.min_confirmed_weight {
                                    record.min_confirmed_weight = *weight;
                                }
                            }
                        }
                    });
            }
        }

        // branch-weight movements are tracked on the heaviest peer only
        if let Some(peer) = network.peer(0) {
            let tangle = peer.node().tangle();

            {
                let monitor = self.clone();
                tangle
                    .opinion_manager
                    .events
                    .approval_weight_updated
                    .attach(move |(color, delta)| {
                        monitor.colors.add("opinionsWeights", *color, *delta);
                    });
            }

            {
                let monitor = self.clone();
                tangle.tip_manager.events.message_processed.attach(
                    move |(opinion, tip_pool_size, processed, issued)| {
                        monitor
                            .colors
                            .set("tipPoolSizes", *opinion, *tip_pool_size as i64);
                        monitor
                            .colors
                            .set("processedMessages", *opinion, *processed as i64);
                        monitor.atomics.set("issuedMessages", *issued as i64);
                    },
                );
            }

            {
                let monitor = self.clone();
                tangle.requester.events.request.attach(move |id| {
                    monitor.atomics.add("requestedMissingMessages", 1);
                    debug!(message = %id, "missing message requested");
                });
            }

            {
                let monitor = self.clone();
                tangle
                    .approval_manager
                    .events
                    .message_confirmed
                    .attach(move |(message, _metadata, weight, counter)| {
                        monitor.atomics.add("confirmedMessages", 1);
                        debug!(
                            message = %message.id,
                            weight,
                            created = counter,
                            "message confirmed"
                        );
                    });
            }
        }

        if let Some(peer) = network.peer(config.monitored_witness_weight_peer) {
            peer.node()
                .tangle()
                .approval_manager
                .events
                .message_witness_weight_updated
                .attach(|(message, weight)| {
                    trace!(message = %message.id, weight, "witness weight updated");
                });
        }
    }

    /// Polls opinions and confirmation states, updates flip counters, logs a
    /// status line, and reports whether the stop threshold was reached
    pub fn tick(&self, network: &Network, stop_threshold: f64) -> bool {
        let mut opinions: HashMap<Color, i64> = HashMap::new();
        let mut adversary_opinions: HashMap<Color, i64> = HashMap::new();
        let mut like_weights: HashMap<Color, i64> = HashMap::new();
        let mut honest_confirmed: HashMap<Color, i64> = HashMap::new();
        let mut honest_count = 0i64;

        for peer in network.peers() {
            let opinion = peer.node().tangle().opinion_manager.opinion();
            let adversary = network.is_adversary(peer.id);

            *opinions.entry(opinion).or_insert(0) += 1;
            *like_weights.entry(opinion).or_insert(0) += network.weight(peer.id) as i64;
            if adversary {
                *adversary_opinions.entry(opinion).or_insert(0) += 1;
            } else {
                honest_count += 1;
                if let Some(confirmed) = peer.node().tangle().opinion_manager.confirmed_color() {
                    *honest_confirmed.entry(confirmed).or_insert(0) += 1;
                }
            }
        }

        for color in Color::CONFLICT_COLORS {
            self.colors
                .set("likeAccumulatedWeight", color, *like_weights.get(&color).unwrap_or(&0));
            self.colors
                .set("opinions", color, *opinions.get(&color).unwrap_or(&0));
        }

        let (r, g, b) = (
            *opinions.get(&Color::Red).unwrap_or(&0),
            *opinions.get(&Color::Green).unwrap_or(&0),
            *opinions.get(&Color::Blue).unwrap_or(&0),
        );
        if let Ok(mut current) = self.most_liked.lock() {
            if most_liked_color_changed(r, g, b, &mut current) {
                self.atomics.add("flips", 1);
            }
        }

        let (ar, ag, ab) = (
            *adversary_opinions.get(&Color::Red).unwrap_or(&0),
            *adversary_opinions.get(&Color::Green).unwrap_or(&0),
            *adversary_opinions.get(&Color::Blue).unwrap_or(&0),
        );
        if let Ok(mut current) = self.honest_most_liked.lock() {
            if most_liked_color_changed(r - ar, g - ag, b - ab, &mut current) {
                self.atomics.add("honestFlips", 1);
            }
        }

        info!(
            undefined = *opinions.get(&Color::Undefined).unwrap_or(&0),
            red = r,
            green = g,
            blue = b,
            flips = self.atomics.get("flips"),
            confirmed_messages = self.atomics.get("confirmedMessages"),
            issued = self.atomics.get("issuedMessages"),
            requested = self.atomics.get("requestedMissingMessages"),
            "network status"
        );

        let best_confirmed = Color::CONFLICT_COLORS
            .iter()
            .map(|color| *honest_confirmed.get(color).unwrap_or(&0))
            .max()
            .unwrap_or(0);
        best_confirmed as f64 >= stop_threshold * honest_count as f64 && best_confirmed > 0
    }

    /// Logs the per-node confirmation robustness summary
    pub fn final_report(&self, network: &Network) {
        let mut total_unconfirmations = 0;
        let mut deepest_drop = self.total_weight as i64;

        for (id, record) in self.node_records.iter().enumerate() {
            if let Ok(record) = record.lock() {
                total_unconfirmations += record.unconfirmation_count;
                deepest_drop = deepest_drop.min(record.min_confirmed_weight);
                debug!(
                    peer = id,
                    adversary = network.is_adversary(id),
                    min_confirmed_weight = record.min_confirmed_weight,
                    unconfirmations = record.unconfirmation_count,
                    "node record"
                );
            }
        }

        info!(
            total_unconfirmations,
            deepest_confirmed_weight = deepest_drop,
            "final node records"
        );
    }

    /// Lowest confirmed weight a node observed (the total when never below)
    pub fn node_min_confirmed_weight(&self, id: usize) -> i64 {
        self.node_records
            .get(id)
            .and_then(|record| record.lock().ok().map(|record| record.min_confirmed_weight))
            .unwrap_or(0)
    }

    /// Number of unconfirmations a node went through
    pub fn node_unconfirmation_count(&self, id: usize) -> i64 {
        self.node_records
            .get(id)
            .and_then(|record| record.lock().ok().map(|record| record.unconfirmation_count))
            .unwrap_or(0)
    }
}
