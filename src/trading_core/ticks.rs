//! Per-instrument tick buffers
//!
//! Append-only within a session, cleared wholesale at rollover.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::IngestError;
use crate::types::Tick;

#[derive(Debug, Default)]
pub struct TickStore {
    buffers: HashMap<String, Vec<Tick>>,
}

impl TickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tick. Non-positive or non-finite prices are refused and the
    /// buffer is left untouched.
    pub fn append(&mut self, tick: Tick) -> Result<(), IngestError> {
        if !tick.price.is_finite() || tick.price <= 0.0 {
            return Err(IngestError::InvalidTick {
                instrument: tick.instrument,
                price: tick.price,
            });
        }
        self.buffers.entry(tick.instrument.clone()).or_default().push(tick);
        Ok(())
    }

    /// Ticks with `start <= timestamp < end`. A missing bound is open.
    pub fn window(
        &self,
        instrument: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<&Tick> {
        self.buffers
            .get(instrument)
            .map(|ticks| {
                ticks
                    .iter()
                    .filter(|t| start.map_or(true, |s| t.timestamp >= s))
                    .filter(|t| end.map_or(true, |e| t.timestamp < e))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn latest(&self, instrument: &str) -> Option<&Tick> {
        self.buffers.get(instrument).and_then(|ticks| ticks.last())
    }

    /// Latest tick volume over the mean volume of the `period` ticks before it.
    /// Returns 1.0 when there is no history to compare against.
    pub fn volume_ratio(&self, instrument: &str, period: usize) -> f64 {
        let Some(ticks) = self.buffers.get(instrument) else {
            return 1.0;
        };
        let Some((latest, history)) = ticks.split_last() else {
            return 1.0;
        };
        let lookback = &history[history.len().saturating_sub(period)..];
        if lookback.is_empty() {
            return 1.0;
        }

        let avg = lookback.iter().map(|t| t.volume as f64).sum::<f64>() / lookback.len() as f64;
        if avg <= 0.0 {
            return 1.0;
        }
        latest.volume as f64 / avg
    }

    pub fn len(&self, instrument: &str) -> usize {
        self.buffers.get(instrument).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }

    /// Instruments seen this session, sorted for deterministic iteration
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Session rollover
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
