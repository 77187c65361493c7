// src/runner.rs

//! Simulation assembly and execution.
//!
//! Builds the network from the configuration, paces per-peer issuance by
//! mana share, fires the double-spend trigger, and runs until the stop
//! threshold is reached or the run times out.

use crate::config::{Imif, SimConfig, SimulationMode};
use crate::errors::Result;
use crate::monitor::Monitor;
use multiverse_adversary::{NoGossipNode, SameOpinionNode, ShiftingOpinionNode};
use multiverse_core::{AdversaryNode, Color, Node, NodeInterface};
use multiverse_network::{AdversaryType, Network, NodeFactory, PeerNode};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Node factories for every behavior class
pub fn node_factories() -> HashMap<AdversaryType, NodeFactory> {
    let mut factories: HashMap<AdversaryType, NodeFactory> = HashMap::new();
    factories.insert(
        AdversaryType::Honest,
        Box::new(|id, substrate, config| {
            PeerNode::Honest(Box::new(Node::new(id, config, substrate)))
        }),
    );
    factories.insert(
        AdversaryType::ShiftOpinion,
        Box::new(|id, substrate, config| {
            PeerNode::Adversary(Box::new(ShiftingOpinionNode::new(id, config, substrate)))
        }),
    );
    factories.insert(
        AdversaryType::SameOpinion,
        Box::new(|id, substrate, config| {
            PeerNode::Adversary(Box::new(SameOpinionNode::new(id, config, substrate)))
        }),
    );
    factories.insert(
        AdversaryType::NoGossip,
        Box::new(|id, substrate, config| {
            PeerNode::Adversary(Box::new(NoGossipNode::new(id, config, substrate)))
        }),
    );
    factories
}

/// A fully assembled simulation run
pub struct Simulation {
    config: SimConfig,
    network: Network,
    monitor: Arc<Monitor>,
    stop: watch::Sender<bool>,
}

impl Simulation {
    /// Builds the network and attaches the monitor
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let factories = node_factories();
        let network = Network::new(
            config.nodes_count,
            config.nodes_total_weight,
            config.zipf_parameter,
            &factories,
            config.tangle.clone(),
            config.network_options(),
            &config.adversary_specs()?,
        )?;

        let monitor = Arc::new(Monitor::new(config.nodes_count, network.total_weight()));
        monitor.attach(&config, &network);

        let (stop, _) = watch::channel(false);

        Ok(Self {
            config,
            network,
            monitor,
            stop,
        })
    }

    /// The underlying network
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The attached monitor
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Runs the simulation to completion.
    ///
    /// The run ends when the configured fraction of honest nodes has
    /// confirmed one color, or when the maximum duration elapses.
    pub async fn run(&self) {
        info!("starting simulation");
        self.network.start();
        let issuers = self.spawn_issuers();

        let start = tokio::time::Instant::now();
        let deadline = start + self.config.max_duration();
        let mut ticker = tokio::time::interval(self.config.monitor_tick());
        let mut double_spend_fired = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !double_spend_fired
                        && start.elapsed() >= self.config.double_spend_delay()
                    {
                        self.trigger_double_spend();
                        double_spend_fired = true;
                    }
                    if self
                        .monitor
                        .tick(&self.network, self.config.simulation_stop_threshold)
                    {
                        info!("shutting down simulation: consensus reached");
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!("shutting down simulation: timed out");
                    break;
                }
            }
        }

        let _ = self.stop.send(true);
        self.network.shutdown();
        self.monitor.final_report(&self.network);
        drop(issuers);
    }

    /// Spawns one issuance ticker per peer.
    ///
    /// A peer with share `w` of the speedup-weighted mana issues
    /// `w · tps` messages per second; Poisson mode re-draws every interval
    /// from an exponential distribution.
    fn spawn_issuers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let total_weighted: f64 = self
            .network
            .peers()
            .iter()
            .map(|peer| self.network.weight(peer.id) as f64 * self.network.speedup(peer.id))
            .sum();
        if total_weighted <= 0.0 {
            warn!("no mana in the network; nothing will be issued");
            return Vec::new();
        }

        let mut handles = Vec::new();
        for peer in self.network.peers() {
            let band = self.network.speedup(peer.id)
                * self.network.weight(peer.id) as f64
                * self.config.tps
                / total_weighted;
            if band <= 0.0 {
                warn!(peer = peer.id, "peer has no issuance bandwidth");
                continue;
            }

            let base = Duration::from_secs_f64(self.config.slowdown_factor.max(0.001) / band);
            let imif = self.config.imif;
            let peer = peer.clone();
            let mut stop = self.stop.subscribe();

            handles.push(tokio::spawn(async move {
                let mut pace = base;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(pace) => {
                            peer.node().issue_payload(Color::Undefined);
                            if imif == Imif::Poisson {
                                let draw: f64 =
                                    rand::thread_rng().gen_range(f64::EPSILON..1.0);
                                pace = base.mul_f64((-draw.ln()).max(0.05));
                            }
                        }
                        _ = stop.changed() => break,
                    }
                }
            }));
        }

        handles
    }

    /// Issues the conflicting payloads that start the double spend
    fn trigger_double_spend(&self) {
        match self.config.simulation_mode {
            SimulationMode::Adversary => {
                for group in self.network.adversary_groups() {
                    let color = group.init_color;
                    for id in &group.node_ids {
                        if let Some(peer) = self.network.peer(*id) {
                            if let Some(adversary) = peer.as_adversary() {
                                adversary.assign_color(color);
                            }
                            peer.node().issue_payload(color);
                            info!(peer = id, color = %color, "double-spend message issued");
                        }
                    }
                }
            }
            SimulationMode::Accidental => {
                for (index, id) in self
                    .network
                    .heaviest_honest_peers(2)
                    .into_iter()
                    .enumerate()
                {
                    let color = Color::from_index(index + 1);
                    if let Some(peer) = self.network.peer(id) {
                        peer.node().issue_payload(color);
                        info!(peer = id, color = %color, "accidental double-spend issued");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdversaryGroupConfig;

    fn fast_config(nodes_count: usize) -> SimConfig {
        SimConfig {
            nodes_count,
            nodes_total_weight: 100,
            zipf_parameter: 0.9,
            tps: 200.0,
            min_delay_ms: 1,
            max_delay_ms: 2,
            packet_loss: 0.0,
            neighbour_count: 4,
            randomness: 0.0,
            double_spend_delay_ms: 100,
            consensus_monitor_tick_ms: 50,
            simulation_max_duration_s: 5,
            ..Default::default()
        }
    }

    async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_same_opinion_adversary_cannot_win() {
        // four peers; the lightest one is a same-opinion adversary on Blue
        let mut config = fast_config(4);
        config.adversary_groups.push(AdversaryGroupConfig {
            kind: 2,
            node_count: 1,
            init_color: "B".to_string(),
            mana_share: None,
            speedup: 1.0,
            peer_with_everyone: false,
        });

        let simulation = Simulation::new(config).unwrap();
        simulation.network().start();

        simulation.trigger_double_spend();
        for id in 0..3 {
            simulation
                .network()
                .peer(id)
                .unwrap()
                .node()
                .issue_payload(Color::Red);
        }

        let network = simulation.network();
        let converged = wait_until(Duration::from_secs(3), || {
            (0..3).all(|id| {
                let opinion_manager =
                    &network.peer(id).unwrap().node().tangle().opinion_manager;
                opinion_manager.opinion() == Color::Red
                    && opinion_manager.confirmed_color() == Some(Color::Red)
            })
        })
        .await;
        assert!(converged, "honest peers did not converge on red");

        let adversary_mana = network.weight(3) as i64;
        for id in 0..3 {
            let opinion_manager = &network.peer(id).unwrap().node().tangle().opinion_manager;
            assert_eq!(opinion_manager.branch_weight(Color::Blue), adversary_mana);
        }

        // nobody ever confirmed blue
        assert_eq!(
            simulation
                .monitor()
                .colors
                .get("confirmedNodes", Color::Blue),
            0
        );
        assert_eq!(
            network
                .peer(3)
                .unwrap()
                .node()
                .tangle()
                .opinion_manager
                .opinion(),
            Color::Blue
        );

        simulation.network().shutdown();
    }

    #[tokio::test]
    async fn test_accidental_double_spend_run_converges() {
        let mut config = fast_config(5);
        config.nodes_total_weight = 1_000;
        config.simulation_mode = SimulationMode::Accidental;

        let simulation = Simulation::new(config).unwrap();
        simulation.run().await;

        // the heaviest branch wins on every peer
        for peer in simulation.network().peers() {
            assert_eq!(
                peer.node().tangle().opinion_manager.confirmed_color(),
                Some(Color::Red)
            );
        }
        assert!(simulation.monitor().atomics.get("issuedMessages") > 0);
    }
}
