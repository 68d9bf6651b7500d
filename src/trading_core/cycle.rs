//! Strategy cycle orchestration
//!
//! `StrategyCycle` is the single owner of every piece of mutable strategy
//! state: tick buffers, cached profiles, breakout flags, open positions and
//! trade history. Ticks come in through [`StrategyCycle::ingest`]; decisions
//! come out of [`StrategyCycle::run_cycle`]. Callers serialize the two (the
//! runner feeds both from one task).
//!
//! One cycle, in order:
//! 1. Session rollover and end-of-day square-off
//! 2. Build missing profiles once the session is profile-ready
//! 3. Mark every open position to its latest quote and check exits
//! 4. If slots remain: detect breakouts and evaluate pending events
//! 5. Rank signals by confidence and admit them until slots run out

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::breakout::BreakoutDetector;
use super::metrics::StrategyMetrics;
use super::position::{PositionManager, TickOutcome, TradeResult};
use super::profile::{ProfileBuilder, VolumeProfile};
use super::signal::{Rejection, Signal, SignalEvaluator};
use super::ticks::TickStore;
use crate::config::{ProfilePeriod, StrategyConfig};
use crate::error::{ConfigError, IngestError, PositionError, ProfileError};
use crate::session::SessionSchedule;
use crate::types::{Direction, ExitReason, Tick};

/// Instructions for the execution collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Open {
        position_id: Uuid,
        instrument: String,
        direction: Direction,
        quantity: u64,
        entry: f64,
        stop: f64,
        target: f64,
    },
    Close {
        position_id: Uuid,
        instrument: String,
        exit_price: f64,
        reason: ExitReason,
    },
    UpdateStop {
        position_id: Uuid,
        instrument: String,
        new_stop: f64,
    },
}

impl Decision {
    fn close(trade: &TradeResult) -> Self {
        Decision::Close {
            position_id: trade.position_id,
            instrument: trade.instrument.clone(),
            exit_price: trade.exit_price,
            reason: trade.exit_reason,
        }
    }
}

/// Everything one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Decisions in the order they were taken, including those produced by
    /// ingestion since the previous cycle
    pub decisions: Vec<Decision>,
    /// Trades closed since the previous cycle
    pub closed: Vec<TradeResult>,
    pub profiles_built: Vec<String>,
    pub profile_failures: Vec<ProfileError>,
    /// Signals that passed the filters, ranked by confidence
    pub signals: Vec<Signal>,
    pub rejections: Vec<(String, Rejection)>,
    /// Signals under `min_confidence`
    pub below_confidence: usize,
    pub admitted: usize,
    pub refused: Vec<PositionError>,
    pub rolled_over: bool,
    pub square_off: bool,
}

pub struct StrategyCycle {
    config: StrategyConfig,
    schedule: SessionSchedule,
    ticks: TickStore,
    builder: ProfileBuilder,
    profiles: HashMap<String, VolumeProfile>,
    detector: BreakoutDetector,
    evaluator: SignalEvaluator,
    positions: PositionManager,
    /// Decisions and trades produced by ingestion, drained by the next cycle
    outbox: Vec<Decision>,
    closed_outbox: Vec<TradeResult>,
    session: Option<NaiveDate>,
    /// Daily loss limit hit; no admissions until rollover
    halted: bool,
}

impl StrategyCycle {
    pub fn new(config: StrategyConfig, schedule: SessionSchedule) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            builder: ProfileBuilder::new(config.to_profile_params()),
            detector: BreakoutDetector::new(config.min_breakout_distance_pct),
            evaluator: SignalEvaluator::new(config.to_signal_params()),
            positions: PositionManager::new(config.to_position_params()),
            ticks: TickStore::new(),
            profiles: HashMap::new(),
            outbox: Vec::new(),
            closed_outbox: Vec::new(),
            session: None,
            halted: false,
            config,
            schedule,
        })
    }

    /// Append a tick, mark its instrument's position and check for a breakout
    pub fn ingest(&mut self, tick: Tick) -> Result<(), IngestError> {
        self.roll_session(tick.timestamp);
        self.ticks.append(tick.clone())?;

        if let Some(outcome) = self.positions.on_tick(&tick.instrument, tick.price, tick.timestamp) {
            self.record_outcome(&tick.instrument, outcome);
        }

        if let Some(profile) = self.profiles.get(&tick.instrument) {
            self.detector.check(&tick, profile);
        }
        Ok(())
    }

    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            rolled_over: self.roll_session(now),
            ..Default::default()
        };

        // 1. End of day
        report.square_off = self.schedule.is_square_off(now);
        if report.square_off && self.positions.open_count() > 0 {
            info!("SQUARE OFF: closing {} open positions", self.positions.open_count());
            for trade in self.positions.square_off_all(now) {
                self.outbox.push(Decision::close(&trade));
                self.closed_outbox.push(trade);
            }
        }

        // 2. Profiles
        let profile_ready = self.schedule.is_profile_ready(now);
        if profile_ready && !report.square_off && !self.ticks.is_empty() {
            self.build_profiles(now, &mut report);
        }

        // 3. Open positions against the latest quotes
        let marks: Vec<(String, f64)> = self
            .positions
            .positions()
            .filter_map(|p| self.ticks.latest(&p.instrument).map(|t| (p.instrument.clone(), t.price)))
            .collect();
        for (instrument, price) in marks {
            if let Some(outcome) = self.positions.on_tick(&instrument, price, now) {
                self.record_outcome(&instrument, outcome);
            }
        }

        // 4-5. New entries
        if !self.halted && self.positions.session_pnl() <= -self.config.max_daily_loss() {
            warn!(
                "Daily loss limit reached: {:.2} (limit {:.2}), no new entries this session",
                self.positions.session_pnl(),
                self.config.max_daily_loss()
            );
            self.halted = true;
        }
        if profile_ready && !report.square_off && !self.halted && self.positions.available_slots() > 0 {
            self.scan_breakouts(now, &mut report);
            self.admit(now, &mut report);
        }

        report.decisions.extend(self.outbox.drain(..));
        report.closed.extend(self.closed_outbox.drain(..));

        debug!(
            "CYCLE: {} decisions | {} profiles built | {} signals | {} rejected | {} admitted | {} open",
            report.decisions.len(),
            report.profiles_built.len(),
            report.signals.len(),
            report.rejections.len(),
            report.admitted,
            self.positions.open_count()
        );
        report
    }

    /// Clear all per-session state. Open positions are left alone; callers
    /// square off first.
    pub fn reset_session(&mut self) {
        self.ticks.clear();
        self.profiles.clear();
        self.detector.clear();
        self.positions.reset_session();
        self.halted = false;
    }

    /// Roll to a new session when `now` falls on a later session date.
    /// Returns true if a rollover happened.
    fn roll_session(&mut self, now: DateTime<Utc>) -> bool {
        let date = self.schedule.session_date(now);
        match self.session {
            Some(current) if date > current => {
                info!("SESSION ROLLOVER: {} -> {}", current, date);
                for trade in self.positions.square_off_all(now) {
                    self.outbox.push(Decision::close(&trade));
                    self.closed_outbox.push(trade);
                }
                self.reset_session();
                self.session = Some(date);
                true
            }
            Some(_) => false,
            None => {
                self.session = Some(date);
                false
            }
        }
    }

    fn record_outcome(&mut self, instrument: &str, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Held => {}
            TickOutcome::StopMoved(new_stop) => {
                if let Some(pos) = self.positions.get(instrument) {
                    self.outbox.push(Decision::UpdateStop {
                        position_id: pos.id,
                        instrument: instrument.to_string(),
                        new_stop,
                    });
                }
            }
            TickOutcome::Closed(trade) => {
                self.outbox.push(Decision::close(&trade));
                self.closed_outbox.push(trade);
            }
        }
    }

    fn needs_profile(&self, instrument: &str, now: DateTime<Utc>) -> bool {
        match (self.profiles.get(instrument), self.config.profile_period) {
            (None, _) => true,
            (Some(_), ProfilePeriod::Session) => false,
            (Some(profile), ProfilePeriod::Rolling { minutes }) => {
                now - profile.window_end >= Duration::minutes(minutes as i64)
            }
        }
    }

    fn build_profiles(&mut self, now: DateTime<Utc>, report: &mut CycleReport) {
        // Session profiles start at the open so pre-open prints stay out
        let start = match self.config.profile_period {
            ProfilePeriod::Session => self.schedule.open_at(now),
            ProfilePeriod::Rolling { minutes } => Some(now - Duration::minutes(minutes as i64)),
        };

        for instrument in self.ticks.instruments() {
            if !self.needs_profile(&instrument, now) {
                continue;
            }
            let window = self.ticks.window(&instrument, start, None);
            match self.builder.build(&instrument, &window, start, None) {
                Ok(profile) => {
                    info!(
                        "PROFILE: {} | POC {:.2} | VA {:.2}-{:.2} | width {:.2}% | strength {:.2}",
                        instrument, profile.poc, profile.val, profile.vah, profile.profile_width_pct, profile.poc_strength
                    );
                    self.profiles.insert(instrument.clone(), profile);
                    self.detector.arm(&instrument);
                    report.profiles_built.push(instrument);
                }
                Err(e) => {
                    warn!("Profile build skipped: {}", e);
                    report.profile_failures.push(e);
                }
            }
        }
    }

    fn scan_breakouts(&mut self, now: DateTime<Utc>, report: &mut CycleReport) {
        for (instrument, profile) in &self.profiles {
            if let Some(tick) = self.ticks.latest(instrument) {
                self.detector.check(tick, profile);
            }
        }

        for instrument in self.detector.pending_instruments() {
            // Held until the position closes
            if self.positions.has_position(&instrument) {
                continue;
            }
            let (Some(profile), Some(tick)) = (self.profiles.get(&instrument), self.ticks.latest(&instrument)) else {
                continue;
            };
            let price = tick.price;
            let Some(event) = self.detector.consume(&instrument) else {
                continue;
            };

            let volume_ratio = self.ticks.volume_ratio(&instrument, self.config.volume_ma_period);
            match self.evaluator.evaluate(&event, profile, price, volume_ratio, now) {
                Ok(signal) => report.signals.push(signal),
                Err(rejection) => {
                    info!("REJECTED: {} {:?} breakout | {}", instrument, event.side, rejection);
                    report.rejections.push((instrument, rejection));
                }
            }
        }
    }

    fn admit(&mut self, now: DateTime<Utc>, report: &mut CycleReport) {
        report.signals.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.instrument.cmp(&b.instrument))
        });

        for signal in &report.signals {
            if signal.confidence < self.config.min_confidence {
                debug!(
                    "{} confidence {:.2} below minimum {:.2}",
                    signal.instrument, signal.confidence, self.config.min_confidence
                );
                report.below_confidence += 1;
                continue;
            }
            if self.positions.available_slots() == 0 {
                report.refused.push(PositionError::SlotExhausted {
                    max: self.config.max_positions,
                });
                continue;
            }

            info!(
                "SIGNAL: {} {} | confidence {:.2} | R:R {:.2}",
                signal.instrument,
                signal.direction,
                signal.confidence,
                signal.risk_reward()
            );
            match self.positions.open(signal, now) {
                Ok(position) => {
                    self.outbox.push(Decision::Open {
                        position_id: position.id,
                        instrument: position.instrument.clone(),
                        direction: position.direction,
                        quantity: position.quantity,
                        entry: position.entry_price,
                        stop: position.current_stop,
                        target: position.target,
                    });
                    report.admitted += 1;
                }
                Err(e) => {
                    info!("SKIPPED: {} {} | {}", signal.instrument, signal.direction, e);
                    report.refused.push(e);
                }
            }
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn schedule(&self) -> &SessionSchedule {
        &self.schedule
    }

    pub fn profile(&self, instrument: &str) -> Option<&VolumeProfile> {
        self.profiles.get(instrument)
    }

    pub fn ticks(&self) -> &TickStore {
        &self.ticks
    }

    pub fn detector(&self) -> &BreakoutDetector {
        &self.detector
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn history(&self) -> &[TradeResult] {
        self.positions.history()
    }

    pub fn metrics(&self) -> StrategyMetrics {
        self.positions.metrics()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn session(&self) -> Option<NaiveDate> {
        self.session
    }

    /// One-line status for periodic logging
    pub fn status(&self) -> String {
        format!(
            "{} instruments | {} profiles | {} open | session P&L {:+.2} | unrealized {:+.2} | {} trades",
            self.ticks.instruments().len(),
            self.profiles.len(),
            self.positions.open_count(),
            self.positions.session_pnl(),
            self.positions.unrealized_pnl(),
            self.positions.history().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            price_buckets: 10,
            ..Default::default()
        }
    }

    fn cycle_with(config: StrategyConfig) -> StrategyCycle {
        StrategyCycle::new(config, SessionSchedule::always_open()).unwrap()
    }

    /// 40 ticks between 99 and 101, half of the volume at 100 (POC ~100, VAH ~100.8)
    fn seed(cycle: &mut StrategyCycle, instrument: &str) {
        let pattern = [99.0, 99.5, 100.0, 100.0, 100.0, 100.5, 101.0, 100.0];
        for i in 0..40 {
            cycle
                .ingest(Tick::new(instrument, pattern[i % pattern.len()], 100, at(i as i64)))
                .unwrap();
        }
    }

    fn opened(report: &CycleReport) -> Vec<&str> {
        report
            .decisions
            .iter()
            .filter_map(|d| match d {
                Decision::Open { instrument, .. } => Some(instrument.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_breakout_opens_position() {
        let mut cycle = cycle_with(config());
        seed(&mut cycle, "INFY");

        let report = cycle.run_cycle(at(40));
        assert_eq!(report.profiles_built, vec!["INFY".to_string()]);
        assert!(report.decisions.is_empty());
        let profile = cycle.profile("INFY").unwrap();
        assert!(profile.val <= profile.poc && profile.poc <= profile.vah);

        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        assert!(cycle.detector().pending("INFY").is_some());

        let report = cycle.run_cycle(at(42));
        assert_eq!(report.signals.len(), 1);
        assert!(report.signals[0].confidence >= 0.65);
        assert_eq!(opened(&report), vec!["INFY"]);
        assert!(cycle.detector().pending("INFY").is_none());

        let position = cycle.positions().get("INFY").unwrap();
        assert_eq!(position.direction, Direction::Long);
        assert_eq!(position.entry_price, 103.0);
        assert!(position.current_stop < 103.0 && position.target > 103.0);
    }

    #[test]
    fn test_rejected_breakout_is_not_retried() {
        let mut cycle = cycle_with(StrategyConfig {
            min_confidence: 0.95,
            ..config()
        });
        seed(&mut cycle, "INFY");
        cycle.run_cycle(at(40));

        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        let report = cycle.run_cycle(at(42));
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.below_confidence, 1);
        assert_eq!(report.admitted, 0);

        // Still outside the value area, but the event was spent
        cycle.ingest(Tick::new("INFY", 104.0, 2000, at(43))).unwrap();
        let report = cycle.run_cycle(at(44));
        assert!(report.signals.is_empty());
        assert!(report.rejections.is_empty());
    }

    #[test]
    fn test_filter_rejection_consumes_event() {
        let mut cycle = cycle_with(config());
        seed(&mut cycle, "INFY");
        cycle.run_cycle(at(40));

        // Breakout on ordinary volume fails volume confirmation
        cycle.ingest(Tick::new("INFY", 103.0, 100, at(41))).unwrap();
        let report = cycle.run_cycle(at(42));
        assert_eq!(report.rejections.len(), 1);
        assert!(matches!(report.rejections[0].1, Rejection::VolumeNotConfirmed { .. }));

        cycle.ingest(Tick::new("INFY", 103.5, 5000, at(43))).unwrap();
        assert!(cycle.run_cycle(at(44)).signals.is_empty());
    }

    #[test]
    fn test_ranking_admits_highest_confidence_within_slots() {
        let mut cycle = cycle_with(StrategyConfig {
            max_positions: 1,
            ..config()
        });
        seed(&mut cycle, "AAA");
        seed(&mut cycle, "BBB");
        cycle.run_cycle(at(40));

        // BBB arrives first but scores lower (volume ratio 1.6 vs 10)
        cycle.ingest(Tick::new("BBB", 103.0, 160, at(41))).unwrap();
        cycle.ingest(Tick::new("AAA", 103.0, 1000, at(41))).unwrap();

        let report = cycle.run_cycle(at(42));
        assert_eq!(report.signals.len(), 2);
        assert_eq!(report.signals[0].instrument, "AAA");
        assert!(report.signals[0].confidence > report.signals[1].confidence);
        assert_eq!(opened(&report), vec!["AAA"]);
        assert_eq!(report.refused, vec![PositionError::SlotExhausted { max: 1 }]);

        // The losing candidate's event is gone too
        assert!(cycle.detector().pending("BBB").is_none());
    }

    #[test]
    fn test_stop_exit_during_ingest_reaches_next_report() {
        let mut cycle = cycle_with(config());
        seed(&mut cycle, "INFY");
        cycle.run_cycle(at(40));
        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        cycle.run_cycle(at(42));
        assert_eq!(cycle.positions().open_count(), 1);

        // Back through the POC stop
        cycle.ingest(Tick::new("INFY", 99.0, 100, at(100))).unwrap();
        assert_eq!(cycle.positions().open_count(), 0);

        let report = cycle.run_cycle(at(101));
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].exit_reason, ExitReason::StopLoss);
        assert!(report.decisions.iter().any(|d| matches!(
            d,
            Decision::Close {
                reason: ExitReason::StopLoss,
                ..
            }
        )));
        assert_eq!(cycle.history().len(), 1);
        assert_eq!(cycle.metrics().losing_trades, 1);
    }

    #[test]
    fn test_trailing_stop_emits_update() {
        let mut cycle = cycle_with(config());
        seed(&mut cycle, "INFY");
        cycle.run_cycle(at(40));
        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        cycle.run_cycle(at(42));

        cycle.ingest(Tick::new("INFY", 105.0, 100, at(43))).unwrap();
        let report = cycle.run_cycle(at(44));
        let update = report.decisions.iter().find_map(|d| match d {
            Decision::UpdateStop { new_stop, .. } => Some(*new_stop),
            _ => None,
        });
        assert!((update.unwrap() - 105.0 * 0.995).abs() < 1e-9);
    }

    #[test]
    fn test_profile_failures_are_per_instrument() {
        let mut cycle = cycle_with(config());
        seed(&mut cycle, "INFY");
        for i in 0..3 {
            cycle.ingest(Tick::new("TCS", 3000.0 + i as f64, 10, at(i))).unwrap();
        }

        let report = cycle.run_cycle(at(40));
        assert_eq!(report.profiles_built, vec!["INFY".to_string()]);
        assert_eq!(report.profile_failures.len(), 1);
        assert!(matches!(
            report.profile_failures[0],
            ProfileError::InsufficientData { ticks: 3, .. }
        ));

        // Retried next cycle once enough ticks exist
        for i in 3..12 {
            cycle.ingest(Tick::new("TCS", 3000.0 + i as f64, 10, at(40 + i))).unwrap();
        }
        let report = cycle.run_cycle(at(60));
        assert_eq!(report.profiles_built, vec!["TCS".to_string()]);
    }

    #[test]
    fn test_no_profile_before_ready_time() {
        let schedule = SessionSchedule::parse("UTC", "09:00", "10:00", "15:00").unwrap();
        let mut cycle = StrategyCycle::new(config(), schedule).unwrap();
        seed(&mut cycle, "INFY");

        assert!(cycle.run_cycle(at(40)).profiles_built.is_empty());
        let report = cycle.run_cycle(t0() + Duration::hours(1));
        assert_eq!(report.profiles_built.len(), 1);
    }

    #[test]
    fn test_session_profile_starts_at_open() {
        let schedule = SessionSchedule::parse("UTC", "09:00", "09:00", "15:00").unwrap();
        let mut cycle = StrategyCycle::new(config(), schedule).unwrap();

        // Pre-open auction print, far below the session range and heavier than all of it
        cycle
            .ingest(Tick::new("INFY", 50.0, 100_000, t0() - Duration::minutes(15)))
            .unwrap();
        seed(&mut cycle, "INFY");

        let report = cycle.run_cycle(at(40));
        assert_eq!(report.profiles_built, vec!["INFY".to_string()]);
        let profile = cycle.profile("INFY").unwrap();
        assert_eq!(profile.tick_count, 40);
        assert_eq!(profile.window_start, t0());
        assert_eq!(profile.price_min, 99.0);
        assert!(profile.val >= 99.0 && profile.vah <= 101.0);
        assert!((profile.poc - 100.0).abs() < 0.5);

        // In-session prices are not breakouts against this profile
        cycle.ingest(Tick::new("INFY", 100.5, 100, at(41))).unwrap();
        assert!(cycle.detector().pending("INFY").is_none());
        assert!(cycle.detector().is_armed("INFY"));
    }

    #[test]
    fn test_rolling_profile_rebuild_discards_pending_breakout() {
        let mut cycle = cycle_with(StrategyConfig {
            profile_period: ProfilePeriod::Rolling { minutes: 1 },
            ..config()
        });
        seed(&mut cycle, "INFY");
        assert_eq!(cycle.run_cycle(at(40)).profiles_built, vec!["INFY".to_string()]);
        assert_eq!(cycle.profile("INFY").unwrap().tick_count, 40);

        // Last profiled tick was at 39s: not stale yet
        assert!(cycle.run_cycle(at(50)).profiles_built.is_empty());

        // Breakout left pending, then the window moves on
        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(51))).unwrap();
        assert!(cycle.detector().pending("INFY").is_some());
        let pattern = [99.0, 99.5, 100.0, 100.0, 100.0, 100.5, 101.0, 100.0];
        for i in 0..12 {
            cycle
                .ingest(Tick::new("INFY", pattern[i % pattern.len()], 100, at(70 + i as i64)))
                .unwrap();
        }
        assert!(cycle.detector().pending("INFY").is_some());

        let report = cycle.run_cycle(at(120));
        assert_eq!(report.profiles_built, vec!["INFY".to_string()]);
        assert!(report.signals.is_empty());
        assert!(report.rejections.is_empty());
        assert!(cycle.detector().pending("INFY").is_none());
        assert!(cycle.detector().is_armed("INFY"));

        let profile = cycle.profile("INFY").unwrap();
        assert_eq!(profile.window_start, at(60));
        assert_eq!(profile.tick_count, 12);
        assert_eq!(profile.price_max, 101.0);
        assert_eq!(cycle.positions().open_count(), 0);
    }

    #[test]
    fn test_square_off_and_rollover() {
        let schedule = SessionSchedule::parse("UTC", "09:00", "09:00", "15:00").unwrap();
        let mut cycle = StrategyCycle::new(config(), schedule).unwrap();
        seed(&mut cycle, "INFY");
        cycle.run_cycle(at(40));
        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        cycle.run_cycle(at(42));
        assert_eq!(cycle.positions().open_count(), 1);

        let close = t0() + Duration::hours(6);
        let report = cycle.run_cycle(close);
        assert!(report.square_off);
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].exit_reason, ExitReason::SquareOff);
        assert_eq!(report.closed[0].exit_price, 103.0);

        // Next day: everything per-session is gone
        let next_day = t0() + Duration::days(1);
        cycle.ingest(Tick::new("INFY", 100.0, 10, next_day)).unwrap();
        assert!(cycle.profile("INFY").is_none());
        assert_eq!(cycle.ticks().len("INFY"), 1);
        assert_eq!(cycle.session(), Some(next_day.date_naive()));
        assert_eq!(cycle.history().len(), 1);
    }

    #[test]
    fn test_daily_loss_limit_halts_entries() {
        let mut cycle = cycle_with(StrategyConfig {
            max_daily_loss_pct: 0.5,
            ..config()
        });
        seed(&mut cycle, "INFY");
        seed(&mut cycle, "TCS");
        cycle.run_cycle(at(40));

        cycle.ingest(Tick::new("INFY", 103.0, 1000, at(41))).unwrap();
        cycle.run_cycle(at(42));
        // Stopped out for roughly the full 1% risk budget
        cycle.ingest(Tick::new("INFY", 99.0, 100, at(50))).unwrap();

        cycle.ingest(Tick::new("TCS", 103.0, 1000, at(51))).unwrap();
        let report = cycle.run_cycle(at(52));
        assert!(cycle.is_halted());
        assert!(report.signals.is_empty());
        assert_eq!(report.admitted, 0);
    }

    #[test]
    fn test_invalid_tick_is_refused() {
        let mut cycle = cycle_with(config());
        assert!(cycle.ingest(Tick::new("INFY", -1.0, 10, t0())).is_err());
        assert_eq!(cycle.ticks().len("INFY"), 0);
    }

    #[test]
    fn test_decision_json_shape() {
        let decision = Decision::UpdateStop {
            position_id: Uuid::nil(),
            instrument: "INFY".to_string(),
            new_stop: 101.5,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["action"], "update_stop");
        assert_eq!(json["new_stop"], 101.5);
    }
}
