use std::collections::HashMap;

use crate::types::Tick;

/// Converts cumulative-since-open volume into per-tick increments.
///
/// Some feeds report the session's running volume on every quote. The
/// profile needs each tick's own contribution, so we difference against the
/// previous sample for the same instrument. A drop in the running total means
/// the feed reset (new session), and the raw value is taken as the increment.
#[derive(Debug, Default)]
pub struct VolumeNormalizer {
    last: HashMap<String, u64>,
}

impl VolumeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, mut tick: Tick) -> Tick {
        let cumulative = tick.volume;
        let increment = match self.last.insert(tick.instrument.clone(), cumulative) {
            Some(prev) if cumulative >= prev => cumulative - prev,
            Some(_) => cumulative,
            // First sample: no baseline, contributes nothing
            None => 0,
        };
        tick.volume = increment;
        tick
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}
