//! Synthetic tick feed for demos and smoke runs
//!
//! A seeded random walk per instrument with occasional directional bursts on
//! heavier volume, which is what a value-area breakout looks like.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::Tick;

/// Chance per tick that a quiet instrument starts a burst
const BURST_PROBABILITY: f64 = 0.002;
/// Ticks a burst lasts
const BURST_LENGTH: usize = 300;
/// Per-tick drift during a burst (fraction of price)
const BURST_DRIFT: f64 = 0.0004;
const BURST_VOLUME_MULTIPLIER: f64 = 3.0;

#[derive(Debug)]
struct Walk {
    instrument: String,
    price: f64,
    drift: f64,
    burst_left: usize,
}

/// Deterministic iterator of ticks, round-robin across instruments,
/// one round per second of data time
#[derive(Debug)]
pub struct DemoFeed {
    rng: StdRng,
    walks: Vec<Walk>,
    returns: Normal<f64>,
    volume: LogNormal<f64>,
    clock: DateTime<Utc>,
    cursor: usize,
    remaining: usize,
}

impl DemoFeed {
    pub fn new(instruments: &[String], ticks: usize, seed: u64, start: DateTime<Utc>) -> Result<Self> {
        let walks = instruments
            .iter()
            .enumerate()
            .map(|(i, name)| Walk {
                instrument: name.clone(),
                price: 1000.0 + 500.0 * i as f64,
                drift: 0.0,
                burst_left: 0,
            })
            .collect();

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            walks,
            returns: Normal::new(0.0, 0.0003).context("Invalid return distribution")?,
            volume: LogNormal::new(100f64.ln(), 0.5).context("Invalid volume distribution")?,
            clock: start,
            cursor: 0,
            remaining: ticks,
        })
    }
}

impl Iterator for DemoFeed {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if self.remaining == 0 || self.walks.is_empty() {
            return None;
        }
        self.remaining -= 1;

        if self.cursor == self.walks.len() {
            self.cursor = 0;
            self.clock += Duration::seconds(1);
        }
        let walk = &mut self.walks[self.cursor];
        self.cursor += 1;

        if walk.burst_left == 0 && self.rng.gen::<f64>() < BURST_PROBABILITY {
            walk.burst_left = BURST_LENGTH;
            walk.drift = if self.rng.gen::<bool>() { BURST_DRIFT } else { -BURST_DRIFT };
            debug!("Demo burst on {} (drift {:+.4})", walk.instrument, walk.drift);
        }

        let mut volume = self.volume.sample(&mut self.rng);
        if walk.burst_left > 0 {
            walk.burst_left -= 1;
            walk.price *= 1.0 + walk.drift + self.returns.sample(&mut self.rng);
            volume *= BURST_VOLUME_MULTIPLIER;
        } else {
            walk.price *= 1.0 + self.returns.sample(&mut self.rng);
        }

        // Round to a 0.05 tick size
        let price = (walk.price * 20.0).round() / 20.0;
        Some(Tick::new(walk.instrument.clone(), price, volume.round().max(1.0) as u64, self.clock))
    }
}

/// Demo mode: push the synthetic feed into the strategy channel
pub async fn run_demo_stream(feed: DemoFeed, tx: mpsc::Sender<Tick>) -> Result<usize> {
    info!("Starting synthetic feed");
    let mut sent = 0;
    for tick in feed {
        if tx.send(tick).await.is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
