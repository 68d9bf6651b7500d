//! Value-area breakout detection
//!
//! Each instrument's detector moves Armed -> Pending -> Consumed and stays
//! consumed until its profile is rebuilt. That gives exactly one breakout per
//! instrument per profile lifetime, however many ticks stay outside the
//! value area.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::profile::VolumeProfile;
use crate::types::{Direction, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakoutSide {
    /// Above VAH
    Upper,
    /// Below VAL
    Lower,
}

impl BreakoutSide {
    /// Upper breakouts are traded long, lower breakouts short
    pub fn direction(self) -> Direction {
        match self {
            BreakoutSide::Upper => Direction::Long,
            BreakoutSide::Lower => Direction::Short,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub instrument: String,
    pub side: BreakoutSide,
    /// VAH or VAL
    pub level: f64,
    pub price: f64,
    pub distance_pct: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
enum DetectorState {
    Armed,
    Pending(BreakoutEvent),
    Consumed,
}

#[derive(Debug)]
pub struct BreakoutDetector {
    min_distance_pct: f64,
    states: BTreeMap<String, DetectorState>,
}

impl BreakoutDetector {
    pub fn new(min_distance_pct: f64) -> Self {
        Self {
            min_distance_pct,
            states: BTreeMap::new(),
        }
    }

    /// Re-arm after a profile rebuild, discarding any unconsumed event
    pub fn arm(&mut self, instrument: &str) {
        self.states.insert(instrument.to_string(), DetectorState::Armed);
    }

    /// Compare a tick against the instrument's profile. Returns the event if
    /// this tick triggered one.
    pub fn check(&mut self, tick: &Tick, profile: &VolumeProfile) -> Option<&BreakoutEvent> {
        let state = self.states.get_mut(&tick.instrument)?;
        if *state != DetectorState::Armed {
            return None;
        }

        let event = classify(tick, profile, self.min_distance_pct)?;
        info!(
            "BREAKOUT: {} {:?} @ {:.2} | level {:.2} | {:.2}%",
            event.instrument, event.side, event.price, event.level, event.distance_pct
        );
        *state = DetectorState::Pending(event);
        match state {
            DetectorState::Pending(event) => Some(&*event),
            _ => None,
        }
    }

    pub fn pending(&self, instrument: &str) -> Option<&BreakoutEvent> {
        match self.states.get(instrument) {
            Some(DetectorState::Pending(event)) => Some(event),
            _ => None,
        }
    }

    /// Instruments with an unconsumed event, in name order
    pub fn pending_instruments(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| matches!(s, DetectorState::Pending(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Take the pending event; the instrument stays silent until re-armed
    pub fn consume(&mut self, instrument: &str) -> Option<BreakoutEvent> {
        let state = self.states.get_mut(instrument)?;
        match std::mem::replace(state, DetectorState::Consumed) {
            DetectorState::Pending(event) => Some(event),
            other => {
                *state = other;
                None
            }
        }
    }

    pub fn is_armed(&self, instrument: &str) -> bool {
        matches!(self.states.get(instrument), Some(DetectorState::Armed))
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

fn classify(tick: &Tick, profile: &VolumeProfile, min_distance_pct: f64) -> Option<BreakoutEvent> {
    let price = tick.price;
    let (side, level, distance_pct) = if price > profile.vah && profile.vah > 0.0 {
        (BreakoutSide::Upper, profile.vah, (price - profile.vah) / profile.vah * 100.0)
    } else if price < profile.val && profile.val > 0.0 {
        (BreakoutSide::Lower, profile.val, (profile.val - price) / profile.val * 100.0)
    } else {
        return None;
    };

    if distance_pct < min_distance_pct {
        return None;
    }

    Some(BreakoutEvent {
        instrument: tick.instrument.clone(),
        side,
        level,
        price,
        distance_pct,
        detected_at: tick.timestamp,
    })
}
