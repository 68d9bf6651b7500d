//! Breakout signal scoring and filtering
//!
//! A breakout event becomes a trade candidate only after three filters, in
//! this order:
//! 1. Entry is at least `min_poc_distance_pct` away from POC
//! 2. Volume ratio confirms the move (when `require_volume_confirmation`)
//! 3. Entry is not sitting on a low volume node (when `avoid_low_volume_nodes`)
//!
//! Survivors get a confidence score in [0, 1] built from four tiered factors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::breakout::{BreakoutEvent, BreakoutSide};
use super::profile::VolumeProfile;
use crate::types::Direction;

/// Filter and risk settings for signal evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalParams {
    pub min_poc_distance_pct: f64,
    pub min_volume_ratio: f64,
    pub require_volume_confirmation: bool,
    pub avoid_low_volume_nodes: bool,
    pub node_proximity_pct: f64,
    pub use_poc_as_stop: bool,
    pub stop_loss_pct: f64,
    pub target_multiplier: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            min_poc_distance_pct: 1.0,
            min_volume_ratio: 1.5,
            require_volume_confirmation: true,
            avoid_low_volume_nodes: true,
            node_proximity_pct: 0.5,
            use_poc_as_stop: true,
            stop_loss_pct: 1.5,
            target_multiplier: 2.0,
        }
    }
}

/// Why a breakout did not become a signal. Not an error: the candidate is
/// simply skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("too close to POC: {distance_pct:.2}% < {min:.2}%")]
    PocDistance { distance_pct: f64, min: f64 },

    #[error("volume not confirmed: ratio {ratio:.2} < {min:.2}")]
    VolumeNotConfirmed { ratio: f64, min: f64 },

    #[error("entry {price:.2} is near a low volume node")]
    NearLowVolumeNode { price: f64 },

    /// Price came back through POC before evaluation
    #[error("stop {stop:.2} is on the wrong side of entry {entry:.2}")]
    InvalidStop { entry: f64, stop: f64 },
}

/// Per-factor contributions to confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub volume: f64,
    pub distance: f64,
    pub node: f64,
    pub poc_strength: f64,
}

impl ConfidenceBreakdown {
    pub fn score(volume_ratio: f64, distance_from_poc_pct: f64, near_hvn: bool, near_lvn: bool, poc_strength: f64) -> Self {
        let volume = if volume_ratio >= 2.0 {
            0.30
        } else if volume_ratio >= 1.5 {
            0.20
        } else if volume_ratio >= 1.0 {
            0.10
        } else {
            0.0
        };

        let distance = if distance_from_poc_pct >= 2.0 {
            0.25
        } else if distance_from_poc_pct >= 1.5 {
            0.20
        } else if distance_from_poc_pct >= 1.0 {
            0.15
        } else {
            0.0
        };

        let node = if near_hvn {
            0.25
        } else if !near_lvn {
            0.15
        } else {
            0.05
        };

        let poc_strength = if poc_strength >= 2.0 {
            0.20
        } else if poc_strength >= 1.5 {
            0.15
        } else {
            0.10
        };

        Self {
            volume,
            distance,
            node,
            poc_strength,
        }
    }

    pub fn total(&self) -> f64 {
        (self.volume + self.distance + self.node + self.poc_strength).clamp(0.0, 1.0)
    }
}

/// A scored trade candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub direction: Direction,
    pub side: BreakoutSide,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub confidence: f64,
    pub breakdown: ConfidenceBreakdown,
    pub risk: f64,
    pub reward: f64,
    pub volume_ratio: f64,
    pub distance_from_poc_pct: f64,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub poc_strength: f64,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn risk_reward(&self) -> f64 {
        if self.risk > 0.0 {
            self.reward / self.risk
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalEvaluator {
    params: SignalParams,
}

impl SignalEvaluator {
    pub fn new(params: SignalParams) -> Self {
        Self { params }
    }

    /// Turn a breakout into a signal, or say why not.
    ///
    /// `price` is the current quote and becomes the entry.
    pub fn evaluate(
        &self,
        event: &BreakoutEvent,
        profile: &VolumeProfile,
        price: f64,
        volume_ratio: f64,
        now: DateTime<Utc>,
    ) -> Result<Signal, Rejection> {
        let p = &self.params;
        let direction = event.side.direction();
        let entry = price;

        let distance_from_poc_pct = profile.distance_from_poc_pct(entry);
        if distance_from_poc_pct < p.min_poc_distance_pct {
            return Err(Rejection::PocDistance {
                distance_pct: distance_from_poc_pct,
                min: p.min_poc_distance_pct,
            });
        }

        if p.require_volume_confirmation && volume_ratio < p.min_volume_ratio {
            return Err(Rejection::VolumeNotConfirmed {
                ratio: volume_ratio,
                min: p.min_volume_ratio,
            });
        }

        let near_lvn = profile.is_near_lvn(entry, p.node_proximity_pct);
        if p.avoid_low_volume_nodes && near_lvn {
            return Err(Rejection::NearLowVolumeNode { price: entry });
        }

        let stop = if p.use_poc_as_stop {
            profile.poc
        } else {
            entry * (1.0 - direction.sign() * p.stop_loss_pct / 100.0)
        };
        // Long stops sit below entry, short stops above
        if (entry - stop) * direction.sign() <= 0.0 {
            return Err(Rejection::InvalidStop { entry, stop });
        }
        let risk = (entry - stop).abs();
        let target = entry + direction.sign() * risk * p.target_multiplier;
        let reward = (target - entry).abs();

        let near_hvn = profile.is_near_hvn(entry, p.node_proximity_pct);
        let breakdown =
            ConfidenceBreakdown::score(volume_ratio, distance_from_poc_pct, near_hvn, near_lvn, profile.poc_strength);
        let confidence = breakdown.total();

        debug!(
            "{} confidence {:.2} = vol {:.2} + dist {:.2} + node {:.2} + poc {:.2}",
            event.instrument, confidence, breakdown.volume, breakdown.distance, breakdown.node, breakdown.poc_strength
        );
        info!(
            "SIGNAL: {} {} @ {:.2} | Stop: {:.2} | Target: {:.2} | Confidence: {:.2}",
            event.instrument, direction, entry, stop, target, confidence
        );

        Ok(Signal {
            instrument: event.instrument.clone(),
            direction,
            side: event.side,
            entry,
            stop,
            target,
            confidence,
            breakdown,
            risk,
            reward,
            volume_ratio,
            distance_from_poc_pct,
            poc: profile.poc,
            vah: profile.vah,
            val: profile.val,
            poc_strength: profile.poc_strength,
            generated_at: now,
        })
    }
}
