//! Replay ticks from a CSV file (optionally zstd-compressed)
//!
//! Expected columns: `instrument,price,volume,timestamp` with RFC 3339
//! timestamps. Files ending in `.zst` are decompressed on the fly.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::VolumeNormalizer;
use crate::types::Tick;

#[derive(Debug, Deserialize)]
struct CsvRow {
    instrument: String,
    price: f64,
    volume: u64,
    timestamp: String,
}

/// Parse ticks from any CSV reader, sorted by timestamp
pub fn parse_ticks<R: Read>(reader: R) -> Result<Vec<Tick>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut ticks = Vec::new();
    for (line, result) in csv_reader.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .with_context(|| format!("Failed to parse timestamp: {}", row.timestamp))?
            .with_timezone(&Utc);
        ticks.push(Tick::new(row.instrument, row.price, row.volume, timestamp));
    }

    // Stable: equal timestamps keep file order
    ticks.sort_by_key(|t| t.timestamp);
    Ok(ticks)
}

/// Load every tick from a `.csv` or `.csv.zst` file
pub fn load_ticks(path: &Path) -> Result<Vec<Tick>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;

    let ticks = if path.extension().is_some_and(|ext| ext == "zst") {
        let decoder = zstd::stream::Decoder::new(file)
            .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
        parse_ticks(BufReader::new(decoder))?
    } else {
        parse_ticks(BufReader::new(file))?
    };

    debug!("Loaded {} ticks from {:?}", ticks.len(), path);
    Ok(ticks)
}

/// Replay mode: send every tick in the file, in time order.
///
/// Stops early if the receiver goes away. Returns the number of ticks sent.
pub async fn run_replay_stream(path: &Path, cumulative_volume: bool, tx: mpsc::Sender<Tick>) -> Result<usize> {
    let ticks = load_ticks(path)?;
    info!("Replaying {} ticks from {:?}", ticks.len(), path);

    let mut normalizer = cumulative_volume.then(VolumeNormalizer::new);
    let mut sent = 0;
    for tick in ticks {
        let tick = match normalizer.as_mut() {
            Some(n) => n.normalize(tick),
            None => tick,
        };
        if tx.send(tick).await.is_err() {
            debug!("Replay receiver closed after {} ticks", sent);
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
