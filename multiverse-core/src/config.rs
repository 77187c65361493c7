// src/config.rs

//! Tangle configuration.

use crate::errors::{Result, TangleError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tip selection algorithm variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipSelectorKind {
    /// Uniform-random tip selection
    #[serde(alias = "URTS")]
    Urts,

    /// Tip selection biased toward tips with higher witness weight
    #[serde(alias = "WURTS")]
    WeightedUrts,

    /// Uniform-random tip selection restricted to tips younger than delta
    #[serde(alias = "RURTS")]
    DeltaUrts,
}

/// Per-node tangle configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TangleConfig {
    /// Number of strong parents selected per new message
    pub parents_count: usize,

    /// Fraction of `parents_count` additionally drawn from the weak tip pool
    pub weak_tips_ratio: f64,

    /// Tip selection algorithm
    pub tsa: TipSelectorKind,

    /// Maximum tip age in nanoseconds for delta-URTS eligibility
    pub delta_urts_ns: u64,

    /// Mana required to confirm a message or color, as a fraction of the
    /// total mana (or an absolute amount, see below)
    pub confirmation_threshold: f64,

    /// When true, the threshold is an absolute mana amount, not a fraction
    pub confirmation_threshold_absolute: bool,

    /// Interval between re-requests of missing messages, in milliseconds
    pub request_interval_ms: u64,
}

impl Default for TangleConfig {
    fn default() -> Self {
        Self {
            parents_count: 8,
            weak_tips_ratio: 0.0,
            tsa: TipSelectorKind::Urts,
            delta_urts_ns: 30_000_000_000,
            confirmation_threshold: 0.66,
            confirmation_threshold_absolute: false,
            request_interval_ms: 100,
        }
    }
}

impl TangleConfig {
    /// Validates the configuration, rejecting degenerate values
    pub fn validate(&self) -> Result<()> {
        if self.parents_count == 0 {
            return Err(TangleError::InvalidConfiguration(
                "parents_count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.weak_tips_ratio) {
            return Err(TangleError::InvalidConfiguration(format!(
                "weak_tips_ratio must be within [0, 1], got {}",
                self.weak_tips_ratio
            )));
        }
        if self.confirmation_threshold <= 0.0 {
            return Err(TangleError::InvalidConfiguration(
                "confirmation_threshold must be positive".to_string(),
            ));
        }
        if !self.confirmation_threshold_absolute && self.confirmation_threshold > 1.0 {
            return Err(TangleError::InvalidConfiguration(format!(
                "fractional confirmation_threshold must be within (0, 1], got {}",
                self.confirmation_threshold
            )));
        }
        if self.request_interval_ms == 0 {
            return Err(TangleError::InvalidConfiguration(
                "request_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks whether `weight` reaches the confirmation threshold
    pub fn weight_confirmed(&self, weight: u64, total_mana: u64) -> bool {
        if self.confirmation_threshold_absolute {
            weight as f64 >= self.confirmation_threshold
        } else {
            weight as f64 >= self.confirmation_threshold * total_mana as f64
        }
    }

    /// Re-request interval for missing messages
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Maximum tip age for delta-URTS
    pub fn delta_urts(&self) -> Duration {
        Duration::from_nanos(self.delta_urts_ns)
    }

    /// Number of weak parents to select alongside the strong parents
    pub fn weak_parents_count(&self) -> usize {
        (self.parents_count as f64 * self.weak_tips_ratio) as usize
    }
}
