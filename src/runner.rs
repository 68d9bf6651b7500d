//! Strategy runner: single-writer ingestion loop
//!
//! Streams push ticks into a bounded mpsc channel. This loop is the only
//! thing that touches the `StrategyCycle`: it ingests each tick and runs a
//! cycle whenever the data clock has moved `cycle_interval` past the previous
//! one, so replays behave the same as live feeds.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::trading_core::{CycleReport, Decision, StrategyCycle, StrategyMetrics, TradeResult};
use crate::types::Tick;

/// CSV log of closed trades, one row per `TradeResult`
pub struct TradeLogger {
    writer: csv::Writer<File>,
}

impl TradeLogger {
    pub fn new(path: &Path) -> Result<Self> {
        // Header only for a new or empty file; existing logs are appended to
        let has_rows = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trade log: {:?}", path))?;

        let writer = csv::WriterBuilder::new().has_headers(!has_rows).from_writer(file);
        Ok(Self { writer })
    }

    pub fn log_trade(&mut self, trade: &TradeResult) -> Result<()> {
        self.writer.serialize(trade).context("Failed to write trade row")?;
        self.writer.flush().context("Failed to flush trade log")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Data-time spacing between strategy cycles
    pub cycle_interval: Duration,
    /// Data-time spacing between status lines and metrics snapshots
    pub status_interval: Duration,
    pub trade_log: Option<PathBuf>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::seconds(10),
            status_interval: Duration::minutes(30),
            trade_log: None,
        }
    }
}

/// What a run did, for the final report
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks_ingested: usize,
    pub ticks_rejected: usize,
    pub cycles: usize,
    pub decisions: usize,
    pub metrics: StrategyMetrics,
    pub trades: Vec<TradeResult>,
}

/// Drive the strategy from a tick channel until the channel closes or Ctrl-C.
/// A final cycle runs at the last tick's timestamp.
pub async fn run_strategy(
    mut strategy: StrategyCycle,
    mut rx: mpsc::Receiver<Tick>,
    options: RunnerOptions,
) -> Result<RunSummary> {
    let mut logger = options.trade_log.as_deref().map(TradeLogger::new).transpose()?;

    let mut summary = RunSummary {
        ticks_ingested: 0,
        ticks_rejected: 0,
        cycles: 0,
        decisions: 0,
        metrics: StrategyMetrics::default(),
        trades: Vec::new(),
    };
    let mut last_cycle: Option<DateTime<Utc>> = None;
    let mut last_status: Option<DateTime<Utc>> = None;
    let mut clock: Option<DateTime<Utc>> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let tick = tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, stopping");
                break;
            }
            tick = rx.recv() => match tick {
                Some(tick) => tick,
                None => break,
            },
        };

        let ts = tick.timestamp;
        if let Err(e) = strategy.ingest(tick) {
            warn!("Tick dropped: {}", e);
            summary.ticks_rejected += 1;
            continue;
        }
        summary.ticks_ingested += 1;
        clock = Some(clock.map_or(ts, |c| c.max(ts)));

        if last_cycle.map_or(true, |last| ts - last >= options.cycle_interval) {
            let report = strategy.run_cycle(ts);
            handle_report(&report, &mut summary, logger.as_mut())?;
            last_cycle = Some(ts);
        }

        if last_status.map_or(true, |last| ts - last >= options.status_interval) {
            info!("STATUS: {}", strategy.status());
            log_metrics(&strategy.metrics());
            last_status = Some(ts);
        }
    }

    if let Some(now) = clock {
        let report = strategy.run_cycle(now);
        handle_report(&report, &mut summary, logger.as_mut())?;
    }

    summary.metrics = strategy.metrics();
    summary.trades = strategy.history().to_vec();
    log_metrics(&summary.metrics);
    Ok(summary)
}

fn handle_report(report: &CycleReport, summary: &mut RunSummary, logger: Option<&mut TradeLogger>) -> Result<()> {
    summary.cycles += 1;
    summary.decisions += report.decisions.len();

    for decision in &report.decisions {
        match decision {
            Decision::Open { .. } | Decision::Close { .. } => {
                info!("DECISION: {}", serde_json::to_string(decision)?)
            }
            Decision::UpdateStop { .. } => debug!("DECISION: {}", serde_json::to_string(decision)?),
        }
    }

    if let Some(logger) = logger {
        for trade in &report.closed {
            logger.log_trade(trade)?;
        }
    }
    Ok(())
}

fn log_metrics(metrics: &StrategyMetrics) {
    match serde_json::to_string(metrics) {
        Ok(json) => info!("METRICS: {}", json),
        Err(e) => warn!("Failed to serialize metrics: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::session::SessionSchedule;
    use crate::types::ExitReason;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    /// Profile seed, a breakout on heavy volume, then a drop through the stop
    fn script() -> Vec<Tick> {
        let pattern = [99.0, 99.5, 100.0, 100.0, 100.0, 100.5, 101.0, 100.0];
        let mut ticks: Vec<Tick> = (0..40)
            .map(|i| Tick::new("INFY", pattern[i % pattern.len()], 100, t0() + Duration::seconds(i as i64)))
            .collect();
        ticks.push(Tick::new("INFY", 103.0, 1000, t0() + Duration::seconds(40)));
        ticks.push(Tick::new("INFY", -1.0, 100, t0() + Duration::seconds(41)));
        ticks.push(Tick::new("INFY", 99.0, 100, t0() + Duration::seconds(42)));
        ticks
    }

    fn strategy() -> StrategyCycle {
        let config = StrategyConfig {
            price_buckets: 10,
            min_ticks: 40,
            ..Default::default()
        };
        StrategyCycle::new(config, SessionSchedule::always_open()).unwrap()
    }

    #[tokio::test]
    async fn test_run_strategy_end_to_end() {
        let log_path = std::env::temp_dir().join(format!("vp-trades-{}.csv", std::process::id()));
        std::fs::remove_file(&log_path).ok();

        let (tx, rx) = mpsc::channel(16);
        let feeder = tokio::spawn(async move {
            for tick in script() {
                tx.send(tick).await.unwrap();
            }
        });

        let options = RunnerOptions {
            cycle_interval: Duration::seconds(1),
            trade_log: Some(log_path.clone()),
            ..Default::default()
        };
        let summary = run_strategy(strategy(), rx, options).await.unwrap();
        feeder.await.unwrap();

        assert_eq!(summary.ticks_ingested, 42);
        assert_eq!(summary.ticks_rejected, 1);
        assert_eq!(summary.trades.len(), 1);
        assert_eq!(summary.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(summary.metrics.total_trades, 1);
        // Open + Close
        assert_eq!(summary.decisions, 2);

        let log = std::fs::read_to_string(&log_path).unwrap();
        std::fs::remove_file(&log_path).ok();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("position_id,instrument,direction"));
        assert!(lines[1].contains("STOP_LOSS"));
    }

    #[tokio::test]
    async fn test_empty_channel_runs_no_cycles() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let summary = run_strategy(strategy(), rx, RunnerOptions::default()).await.unwrap();
        assert_eq!(summary.cycles, 0);
        assert!(summary.trades.is_empty());
    }
}
