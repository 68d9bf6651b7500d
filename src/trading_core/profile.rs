//! Volume profile construction
//!
//! A profile is a histogram of traded volume over `bucket_count` equal-width
//! price buckets spanning the window's low..high range. From it we derive:
//! - POC: the bucket with the most volume (lowest price wins a tie)
//! - Value area: buckets expanded outward from POC until `value_area_pct` of
//!   the volume is covered (upward wins a tie)
//! - HVN/LVN: buckets far above/below the average bucket volume
//!
//! Buckets are addressed by integer index; `price_min + i * bucket_width` is
//! bucket `i`'s lower-bound price, so no float ever acts as a map key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProfileError;
use crate::types::Tick;

/// Parameters for building a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileParams {
    pub bucket_count: usize,
    /// Percent of total volume covered by the value area
    pub value_area_pct: f64,
    /// HVN if bucket volume >= this multiple of the average
    pub high_volume_threshold: f64,
    /// LVN if bucket volume <= this multiple of the average
    pub low_volume_threshold: f64,
    pub min_ticks: usize,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            bucket_count: 50,
            value_area_pct: 70.0,
            high_volume_threshold: 1.5,
            low_volume_threshold: 0.5,
            min_ticks: 10,
        }
    }
}

/// Immutable volume profile for one instrument and one tick window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub instrument: String,
    pub price_min: f64,
    pub price_max: f64,
    pub bucket_width: f64,
    /// Volume per bucket, ascending by price
    pub bucket_volumes: Vec<u64>,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub poc_index: usize,
    pub vah_index: usize,
    pub val_index: usize,
    pub total_volume: u64,
    pub value_area_volume: u64,
    pub avg_bucket_volume: f64,
    pub hvn_levels: Vec<f64>,
    pub lvn_levels: Vec<f64>,
    /// POC volume / average bucket volume
    pub poc_strength: f64,
    pub profile_width: f64,
    pub profile_width_pct: f64,
    pub window_start: DateTime<Utc>,
    /// Exclusive window end when the caller gave one, otherwise the last
    /// tick's timestamp. Rolling rebuilds are timed from this.
    pub window_end: DateTime<Utc>,
    pub tick_count: usize,
}

impl VolumeProfile {
    pub fn is_near_hvn(&self, price: f64, proximity_pct: f64) -> bool {
        is_near_any(&self.hvn_levels, price, proximity_pct)
    }

    pub fn is_near_lvn(&self, price: f64, proximity_pct: f64) -> bool {
        is_near_any(&self.lvn_levels, price, proximity_pct)
    }

    /// |price - poc| as a percentage of poc
    pub fn distance_from_poc_pct(&self, price: f64) -> f64 {
        (price - self.poc).abs() / self.poc * 100.0
    }
}

fn is_near_any(levels: &[f64], price: f64, proximity_pct: f64) -> bool {
    levels
        .iter()
        .any(|level| *level > 0.0 && (price - level).abs() / level * 100.0 <= proximity_pct)
}

#[derive(Debug, Clone, Default)]
pub struct ProfileBuilder {
    params: ProfileParams,
}

impl ProfileBuilder {
    pub fn new(params: ProfileParams) -> Self {
        Self { params }
    }

    /// Build a profile from an ordered tick window.
    ///
    /// `start`/`end` describe the window the ticks were taken from; when
    /// absent the first and last tick timestamps are recorded instead.
    pub fn build(
        &self,
        instrument: &str,
        ticks: &[&Tick],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<VolumeProfile, ProfileError> {
        let (first, last) = match (ticks.first(), ticks.last()) {
            (Some(first), Some(last)) if ticks.len() >= self.params.min_ticks => (first, last),
            _ => {
                return Err(ProfileError::InsufficientData {
                    instrument: instrument.to_string(),
                    ticks: ticks.len(),
                    required: self.params.min_ticks,
                })
            }
        };

        let price_min = ticks.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
        let price_max = ticks.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
        if price_max <= price_min {
            return Err(ProfileError::DegenerateRange {
                instrument: instrument.to_string(),
                price: price_min,
            });
        }

        let n = self.params.bucket_count.max(1);
        let bucket_width = (price_max - price_min) / n as f64;

        let mut bucket_volumes = vec![0u64; n];
        for tick in ticks {
            let raw = ((tick.price - price_min) / bucket_width).floor();
            let index = if raw < 0.0 { 0 } else { (raw as usize).min(n - 1) };
            bucket_volumes[index] += tick.volume;
        }
        let total_volume: u64 = bucket_volumes.iter().sum();

        // Highest volume; strict > keeps the lowest index on ties
        let mut poc_index = 0;
        for (i, v) in bucket_volumes.iter().enumerate() {
            if *v > bucket_volumes[poc_index] {
                poc_index = i;
            }
        }

        // Only buckets that traded take part in the value area and node stats
        let used: Vec<usize> = (0..n).filter(|i| bucket_volumes[*i] > 0).collect();
        let (val_index, vah_index, value_area_volume) =
            expand_value_area(&bucket_volumes, &used, poc_index, self.params.value_area_pct);

        let avg_bucket_volume = if used.is_empty() {
            0.0
        } else {
            total_volume as f64 / used.len() as f64
        };

        let bucket_price = |i: usize| price_min + i as f64 * bucket_width;
        let mut hvn_levels = Vec::new();
        let mut lvn_levels = Vec::new();
        if avg_bucket_volume > 0.0 {
            for &i in &used {
                let vol = bucket_volumes[i] as f64;
                if vol >= self.params.high_volume_threshold * avg_bucket_volume {
                    hvn_levels.push(bucket_price(i));
                } else if vol <= self.params.low_volume_threshold * avg_bucket_volume {
                    lvn_levels.push(bucket_price(i));
                }
            }
        }

        let poc = bucket_price(poc_index);
        let vah = bucket_price(vah_index);
        let val = bucket_price(val_index);
        let poc_strength = if avg_bucket_volume > 0.0 {
            bucket_volumes[poc_index] as f64 / avg_bucket_volume
        } else {
            0.0
        };
        let profile_width = vah - val;
        let profile_width_pct = if poc > 0.0 { profile_width / poc * 100.0 } else { 0.0 };

        debug!(
            "{} profile: POC {:.2} VA {:.2}-{:.2} | {} ticks | strength {:.2} | HVN {} LVN {}",
            instrument,
            poc,
            val,
            vah,
            ticks.len(),
            poc_strength,
            hvn_levels.len(),
            lvn_levels.len()
        );

        Ok(VolumeProfile {
            instrument: instrument.to_string(),
            price_min,
            price_max,
            bucket_width,
            bucket_volumes,
            poc,
            vah,
            val,
            poc_index,
            vah_index,
            val_index,
            total_volume,
            value_area_volume,
            avg_bucket_volume,
            hvn_levels,
            lvn_levels,
            poc_strength,
            profile_width,
            profile_width_pct,
            window_start: start.unwrap_or(first.timestamp),
            window_end: end.unwrap_or(last.timestamp),
            tick_count: ticks.len(),
        })
    }
}

/// Grow the value area outward from POC across the traded buckets.
///
/// Returns (val bucket index, vah bucket index, volume covered).
fn expand_value_area(volumes: &[u64], used: &[usize], poc_index: usize, value_area_pct: f64) -> (usize, usize, u64) {
    let Some(start) = used.iter().position(|i| *i == poc_index) else {
        return (poc_index, poc_index, volumes.get(poc_index).copied().unwrap_or(0));
    };

    let total: u64 = used.iter().map(|i| volumes[*i]).sum();
    let target = total as f64 * value_area_pct / 100.0;

    let mut lo = start;
    let mut hi = start;
    let mut accumulated = volumes[poc_index];

    while (accumulated as f64) < target {
        let upper = (hi + 1 < used.len()).then(|| volumes[used[hi + 1]]);
        let lower = (lo > 0).then(|| volumes[used[lo - 1]]);

        match (upper, lower) {
            (Some(up), Some(down)) if up >= down => {
                hi += 1;
                accumulated += up;
            }
            (_, Some(down)) => {
                lo -= 1;
                accumulated += down;
            }
            (Some(up), None) => {
                hi += 1;
                accumulated += up;
            }
            (None, None) => break,
        }
    }

    (used[lo], used[hi], accumulated)
}
