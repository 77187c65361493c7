// src/config.rs

//! Simulation configuration.

use crate::errors::{Result, SimError};
use multiverse_core::{Color, TangleConfig};
use multiverse_network::{AdversaryGroupSpec, AdversaryType, NetworkOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How inter-message issuance intervals are drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Imif {
    /// Fixed pace
    #[serde(alias = "uniform")]
    Uniform,

    /// Exponentially distributed pace (Poisson arrivals)
    #[serde(alias = "poisson")]
    Poisson,
}

/// What triggers the double spend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationMode {
    /// Adversary groups issue their assigned colors
    Adversary,

    /// The heaviest honest peers accidentally issue conflicting colors
    Accidental,
}

/// One adversary group as written in the configuration file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdversaryGroupConfig {
    /// Behavior code: 1 = shift opinion, 2 = same opinion, 3 = no gossip
    pub kind: i64,

    /// Number of peers in the group
    pub node_count: usize,

    /// Color issued at the double-spend trigger ("R", "G" or "B")
    pub init_color: String,

    /// Overrides each member's mana with this share of the total, when set
    #[serde(default)]
    pub mana_share: Option<f64>,

    /// Issuance-rate multiplier relative to the group's mana
    #[serde(default = "default_speedup")]
    pub speedup: f64,

    /// Members additionally link to every peer
    #[serde(default)]
    pub peer_with_everyone: bool,
}

fn default_speedup() -> f64 {
    1.0
}

/// Complete simulation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of simulated peers
    pub nodes_count: usize,

    /// Sum of all peer manas
    pub nodes_total_weight: u64,

    /// Zipf exponent of the mana distribution (0 = uniform)
    pub zipf_parameter: f64,

    /// Network-wide issuance rate, messages per second
    pub tps: f64,

    /// Lower bound of the per-link delay, milliseconds
    pub min_delay_ms: u64,

    /// Upper bound of the per-link delay, milliseconds
    pub max_delay_ms: u64,

    /// Per-link packet loss probability
    pub packet_loss: f64,

    /// Ring degree of the Watts–Strogatz topology
    pub neighbour_count: usize,

    /// Rewiring probability of the Watts–Strogatz topology
    pub randomness: f64,

    /// Multiplier stretching every delay and pace, for slow-motion runs
    pub slowdown_factor: f64,

    /// Inter-message issuance interval distribution
    pub imif: Imif,

    /// Time from simulation start to the double-spend trigger, milliseconds
    pub double_spend_delay_ms: u64,

    /// What triggers the double spend
    pub simulation_mode: SimulationMode,

    /// Fraction of honest nodes that must confirm one color to stop the run
    pub simulation_stop_threshold: f64,

    /// Hard cap on the run duration, seconds
    pub simulation_max_duration_s: u64,

    /// Monitor reporting cadence, milliseconds
    pub consensus_monitor_tick_ms: u64,

    /// Per-node tangle settings
    pub tangle: TangleConfig,

    /// Adversary groups
    pub adversary_groups: Vec<AdversaryGroupConfig>,

    /// Peer whose witness-weight updates are reported
    pub monitored_witness_weight_peer: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes_count: 100,
            nodes_total_weight: 100_000_000,
            zipf_parameter: 0.9,
            tps: 100.0,
            min_delay_ms: 100,
            max_delay_ms: 100,
            packet_loss: 0.0,
            neighbour_count: 8,
            randomness: 1.0,
            slowdown_factor: 1.0,
            imif: Imif::Uniform,
            double_spend_delay_ms: 20_000,
            simulation_mode: SimulationMode::Adversary,
            simulation_stop_threshold: 1.0,
            simulation_max_duration_s: 60,
            consensus_monitor_tick_ms: 100,
            tangle: TangleConfig::default(),
            adversary_groups: Vec::new(),
            monitored_witness_weight_peer: 0,
        }
    }
}

impl SimConfig {
    /// Loads configuration from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a JSON file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.nodes_count == 0 {
            return Err(SimError::ConfigError(
                "nodes_count must be positive".to_string(),
            ));
        }
        if self.tps <= 0.0 {
            return Err(SimError::ConfigError("tps must be positive".to_string()));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(SimError::ConfigError(format!(
                "min_delay_ms {} exceeds max_delay_ms {}",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.packet_loss) {
            return Err(SimError::ConfigError(format!(
                "packet_loss must be within [0, 1], got {}",
                self.packet_loss
            )));
        }
        self.tangle
            .validate()
            .map_err(|e| SimError::ConfigError(format!("{}", e)))?;
        Ok(())
    }

    /// Link and topology options, with the slowdown factor applied
    pub fn network_options(&self) -> NetworkOptions {
        NetworkOptions {
            min_delay: self.scaled_ms(self.min_delay_ms),
            max_delay: self.scaled_ms(self.max_delay_ms),
            packet_loss: self.packet_loss,
            neighbor_count: self.neighbour_count,
            randomness: self.randomness,
        }
    }

    /// Adversary group specs with parsed colors
    pub fn adversary_specs(&self) -> Result<Vec<AdversaryGroupSpec>> {
        self.adversary_groups
            .iter()
            .map(|group| {
                let init_color: Color = group.init_color.parse().map_err(|e: String| {
                    SimError::ConfigError(format!("adversary init color: {}", e))
                })?;
                Ok(AdversaryGroupSpec {
                    kind: AdversaryType::from_code(group.kind),
                    node_count: group.node_count,
                    init_color,
                    mana_share: group.mana_share,
                    speedup: group.speedup,
                    peer_with_everyone: group.peer_with_everyone,
                })
            })
            .collect()
    }

    /// Delay from start to the double-spend trigger
    pub fn double_spend_delay(&self) -> Duration {
        self.scaled_ms(self.double_spend_delay_ms)
    }

    /// Monitor reporting cadence
    pub fn monitor_tick(&self) -> Duration {
        self.scaled_ms(self.consensus_monitor_tick_ms)
    }

    /// Hard cap on the run duration
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.simulation_max_duration_s).mul_f64(self.slowdown_factor.max(1.0))
    }

    fn scaled_ms(&self, millis: u64) -> Duration {
        Duration::from_millis(millis).mul_f64(self.slowdown_factor.max(f64::MIN_POSITIVE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = SimConfig::default();
        config.nodes_count = 7;
        config.adversary_groups.push(AdversaryGroupConfig {
            kind: 2,
            node_count: 1,
            init_color: "B".to_string(),
            mana_share: Some(0.1),
            speedup: 2.0,
            peer_with_everyone: false,
        });

        let path = std::env::temp_dir().join(format!(
            "multiverse-sim-config-{}.json",
            std::process::id()
        ));
        config.save_to_file(&path).unwrap();
        let loaded = SimConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.nodes_count, 7);
        assert_eq!(loaded.adversary_groups.len(), 1);
        assert_eq!(loaded.adversary_groups[0].init_color, "B");
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let config = SimConfig {
            min_delay_ms: 200,
            max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adversary_specs_parse_colors() {
        let config = SimConfig {
            adversary_groups: vec![AdversaryGroupConfig {
                kind: 1,
                node_count: 2,
                init_color: "Blue".to_string(),
                mana_share: None,
                speedup: 1.0,
                peer_with_everyone: true,
            }],
            ..Default::default()
        };

        let specs = config.adversary_specs().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, AdversaryType::ShiftOpinion);
        assert_eq!(specs[0].init_color, Color::Blue);
        assert!(specs[0].peer_with_everyone);
    }
}
