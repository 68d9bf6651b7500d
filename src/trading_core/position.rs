//! Position lifecycle: sizing, trailing stops, exits, trade history

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::metrics::StrategyMetrics;
use super::signal::Signal;
use crate::error::PositionError;
use crate::types::{Direction, ExitReason};

/// Sizing and risk settings for the position manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionParams {
    pub max_positions: usize,
    pub portfolio_value: f64,
    pub risk_per_trade_pct: f64,
    pub enable_trailing_stops: bool,
    pub trailing_stop_pct: f64,
    pub commission_per_trade: f64,
}

impl PositionParams {
    /// Money at risk per trade
    pub fn risk_budget(&self) -> f64 {
        self.portfolio_value * self.risk_per_trade_pct / 100.0
    }
}

impl Default for PositionParams {
    fn default() -> Self {
        Self {
            max_positions: 5,
            portfolio_value: 100_000.0,
            risk_per_trade_pct: 1.0,
            enable_trailing_stops: true,
            trailing_stop_pct: 0.5,
            commission_per_trade: 0.0,
        }
    }
}

/// An open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: u64,
    pub initial_stop: f64,
    /// Trailing stop; only ever tightens
    pub current_stop: f64,
    pub target: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub last_price: f64,
    pub unrealized_pnl: f64,
    /// Best per-unit excursion in the position's favor (>= 0)
    pub mfe: f64,
    /// Worst per-unit excursion against the position (<= 0)
    pub mae: f64,
    pub entry_time: DateTime<Utc>,
    pub signal_time: DateTime<Utc>,
    // Profile context at entry
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub distance_from_poc_pct: f64,
    pub confidence: f64,
}

impl Position {
    fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign() * self.quantity as f64
    }

    /// Update extremes, excursions and pnl, then tighten the trailing stop.
    /// Returns the new stop if it moved.
    fn mark(&mut self, price: f64, trailing_stop_pct: Option<f64>) -> Option<f64> {
        self.last_price = price;
        self.highest_price = self.highest_price.max(price);
        self.lowest_price = self.lowest_price.min(price);

        let excursion = (price - self.entry_price) * self.direction.sign();
        self.mfe = self.mfe.max(excursion);
        self.mae = self.mae.min(excursion);
        self.unrealized_pnl = self.pnl_at(price);

        let pct = trailing_stop_pct?;
        match self.direction {
            Direction::Long => {
                let candidate = self.highest_price * (1.0 - pct / 100.0);
                if candidate > self.current_stop {
                    self.current_stop = candidate;
                    return Some(candidate);
                }
            }
            Direction::Short => {
                let candidate = self.lowest_price * (1.0 + pct / 100.0);
                if candidate < self.current_stop {
                    self.current_stop = candidate;
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Stop is checked before target
    fn exit_reason(&self, price: f64) -> Option<ExitReason> {
        match self.direction {
            Direction::Long if price <= self.current_stop => Some(ExitReason::StopLoss),
            Direction::Long if price >= self.target => Some(ExitReason::Target),
            Direction::Short if price >= self.current_stop => Some(ExitReason::StopLoss),
            Direction::Short if price <= self.target => Some(ExitReason::Target),
            _ => None,
        }
    }
}

/// Immutable record of a closed position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub position_id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    pub holding_minutes: f64,
    pub mfe: f64,
    pub mae: f64,
    pub initial_stop: f64,
    pub final_stop: f64,
    pub target: f64,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub distance_from_poc_pct: f64,
    pub confidence: f64,
}

impl TradeResult {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// What a tick did to an open position
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Held,
    StopMoved(f64),
    Closed(TradeResult),
}

/// Owns open positions (one per instrument) and the closed-trade history
#[derive(Debug)]
pub struct PositionManager {
    params: PositionParams,
    open: BTreeMap<String, Position>,
    history: Vec<TradeResult>,
    /// Realized net pnl since the last session reset
    session_pnl: f64,
}

impl PositionManager {
    pub fn new(params: PositionParams) -> Self {
        Self {
            params,
            open: BTreeMap::new(),
            history: Vec::new(),
            session_pnl: 0.0,
        }
    }

    /// Size and open a position for a signal
    pub fn open(&mut self, signal: &Signal, now: DateTime<Utc>) -> Result<&Position, PositionError> {
        if self.open.contains_key(&signal.instrument) {
            return Err(PositionError::DuplicatePosition {
                instrument: signal.instrument.clone(),
            });
        }
        if self.open.len() >= self.params.max_positions {
            return Err(PositionError::SlotExhausted {
                max: self.params.max_positions,
            });
        }

        let risk_budget = self.params.risk_budget();
        let quantity = position_size(risk_budget, signal.entry, signal.stop).ok_or_else(|| {
            PositionError::RiskTooSmall {
                instrument: signal.instrument.clone(),
                risk_budget,
                per_unit_risk: (signal.entry - signal.stop).abs(),
            }
        })?;

        let position = Position {
            id: Uuid::new_v4(),
            instrument: signal.instrument.clone(),
            direction: signal.direction,
            entry_price: signal.entry,
            quantity,
            initial_stop: signal.stop,
            current_stop: signal.stop,
            target: signal.target,
            highest_price: signal.entry,
            lowest_price: signal.entry,
            last_price: signal.entry,
            unrealized_pnl: 0.0,
            mfe: 0.0,
            mae: 0.0,
            entry_time: now,
            signal_time: signal.generated_at,
            poc: signal.poc,
            vah: signal.vah,
            val: signal.val,
            distance_from_poc_pct: signal.distance_from_poc_pct,
            confidence: signal.confidence,
        };

        info!(
            "ENTRY: {} {} x{} @ {:.2} | Stop: {:.2} | Target: {:.2}",
            position.instrument, position.direction, quantity, position.entry_price, position.current_stop, position.target
        );

        Ok(&*self.open.entry(signal.instrument.clone()).or_insert(position))
    }

    /// Mark an open position to `price` and close it if the stop or target is hit.
    /// Returns `None` when the instrument has no open position.
    pub fn on_tick(&mut self, instrument: &str, price: f64, now: DateTime<Utc>) -> Option<TickOutcome> {
        let trailing = self.params.enable_trailing_stops.then_some(self.params.trailing_stop_pct);
        let position = self.open.get_mut(instrument)?;

        let moved = position.mark(price, trailing);
        if let Some(stop) = moved {
            debug!("{} trailing stop updated to {:.2}", instrument, stop);
        }

        match position.exit_reason(price) {
            Some(reason) => self.close(instrument, price, reason, now).ok().map(TickOutcome::Closed),
            None => Some(moved.map_or(TickOutcome::Held, TickOutcome::StopMoved)),
        }
    }

    /// Close a position at `price`, append the trade to history and return it
    pub fn close(
        &mut self,
        instrument: &str,
        price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<TradeResult, PositionError> {
        let pos = self.open.remove(instrument).ok_or_else(|| PositionError::UnknownPosition {
            instrument: instrument.to_string(),
        })?;

        let gross_pnl = pos.pnl_at(price);
        let commission = self.params.commission_per_trade;
        let net_pnl = gross_pnl - commission;
        let holding_minutes = (now - pos.entry_time).num_milliseconds() as f64 / 60_000.0;

        let trade = TradeResult {
            position_id: pos.id,
            instrument: pos.instrument,
            direction: pos.direction,
            quantity: pos.quantity,
            entry_price: pos.entry_price,
            exit_price: price,
            entry_time: pos.entry_time,
            exit_time: now,
            exit_reason: reason,
            gross_pnl,
            commission,
            net_pnl,
            holding_minutes,
            mfe: pos.mfe,
            mae: pos.mae,
            initial_stop: pos.initial_stop,
            final_stop: pos.current_stop,
            target: pos.target,
            poc: pos.poc,
            vah: pos.vah,
            val: pos.val,
            distance_from_poc_pct: pos.distance_from_poc_pct,
            confidence: pos.confidence,
        };

        info!(
            "EXIT {}: {} {} @ {:.2} | P&L: {:+.2} | {}",
            reason,
            trade.instrument,
            trade.direction,
            price,
            net_pnl,
            if trade.is_win() { "WIN" } else { "LOSS" }
        );

        self.session_pnl += net_pnl;
        self.history.push(trade.clone());
        Ok(trade)
    }

    /// Close everything at each position's last seen price
    pub fn square_off_all(&mut self, now: DateTime<Utc>) -> Vec<TradeResult> {
        let marks: Vec<(String, f64)> = self.open.values().map(|p| (p.instrument.clone(), p.last_price)).collect();
        marks
            .into_iter()
            .filter_map(|(instrument, price)| self.close(&instrument, price, ExitReason::SquareOff, now).ok())
            .collect()
    }

    pub fn get(&self, instrument: &str) -> Option<&Position> {
        self.open.get(instrument)
    }

    pub fn has_position(&self, instrument: &str) -> bool {
        self.open.contains_key(instrument)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn available_slots(&self) -> usize {
        self.params.max_positions.saturating_sub(self.open.len())
    }

    pub fn history(&self) -> &[TradeResult] {
        &self.history
    }

    pub fn session_pnl(&self) -> f64 {
        self.session_pnl
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn reset_session(&mut self) {
        self.session_pnl = 0.0;
    }

    /// Aggregate metrics recomputed from the full trade history
    pub fn metrics(&self) -> StrategyMetrics {
        StrategyMetrics::from_trades(&self.history)
    }
}

/// Whole units affordable with `risk_budget` when each unit risks |entry - stop|
pub fn position_size(risk_budget: f64, entry: f64, stop: f64) -> Option<u64> {
    let per_unit_risk = (entry - stop).abs();
    if !per_unit_risk.is_finite() || per_unit_risk <= 0.0 || risk_budget <= 0.0 {
        return None;
    }
    let quantity = (risk_budget / per_unit_risk).floor();
    (quantity >= 1.0).then_some(quantity as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::breakout::BreakoutSide;
    use crate::trading_core::signal::ConfidenceBreakdown;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap()
    }

    fn signal(instrument: &str, direction: Direction, entry: f64, stop: f64, target: f64) -> Signal {
        Signal {
            instrument: instrument.to_string(),
            direction,
            side: match direction {
                Direction::Long => BreakoutSide::Upper,
                Direction::Short => BreakoutSide::Lower,
            },
            entry,
            stop,
            target,
            confidence: 0.8,
            breakdown: ConfidenceBreakdown::score(2.0, 2.0, false, false, 2.0),
            risk: (entry - stop).abs(),
            reward: (target - entry).abs(),
            volume_ratio: 2.0,
            distance_from_poc_pct: 2.0,
            poc: stop,
            vah: stop + 1.0,
            val: stop - 1.0,
            poc_strength: 2.0,
            generated_at: t0(),
        }
    }

    fn manager() -> PositionManager {
        PositionManager::new(PositionParams::default())
    }

    #[test]
    fn test_position_sizing() {
        assert_eq!(position_size(1000.0, 100.0, 90.0), Some(100));
        assert_eq!(position_size(1000.0, 100.0, 100.0), None);
        assert_eq!(position_size(5.0, 100.0, 90.0), None);
        assert_eq!(position_size(1000.0, 90.0, 100.0), Some(100));

        let mut pm = manager();
        let pos = pm.open(&signal("INFY", Direction::Long, 100.0, 90.0, 120.0), t0()).unwrap();
        assert_eq!(pos.quantity, 100);
        assert_eq!(pos.current_stop, 90.0);
        assert_eq!(pos.highest_price, 100.0);
    }

    #[test]
    fn test_open_refusals() {
        let mut pm = PositionManager::new(PositionParams {
            max_positions: 2,
            ..Default::default()
        });
        pm.open(&signal("INFY", Direction::Long, 100.0, 90.0, 120.0), t0()).unwrap();

        assert_eq!(
            pm.open(&signal("INFY", Direction::Long, 101.0, 90.0, 120.0), t0()).unwrap_err(),
            PositionError::DuplicatePosition {
                instrument: "INFY".to_string()
            }
        );

        // risk budget 1000 cannot buy one unit risking 5000
        assert!(matches!(
            pm.open(&signal("MRF", Direction::Long, 100_000.0, 95_000.0, 110_000.0), t0()),
            Err(PositionError::RiskTooSmall { .. })
        ));

        pm.open(&signal("TCS", Direction::Short, 3000.0, 3030.0, 2940.0), t0()).unwrap();
        assert_eq!(pm.available_slots(), 0);
        assert_eq!(
            pm.open(&signal("SBIN", Direction::Long, 500.0, 490.0, 520.0), t0()).unwrap_err(),
            PositionError::SlotExhausted { max: 2 }
        );
    }

    #[test]
    fn test_long_trailing_stop_never_loosens() {
        let mut pm = manager();
        pm.open(&signal("INFY", Direction::Long, 100.0, 95.0, 200.0), t0()).unwrap();

        let prices = [101.0, 103.0, 102.6, 105.0, 104.6, 106.0, 105.6];
        let mut last_stop = 95.0;
        for (i, price) in prices.iter().enumerate() {
            let outcome = pm.on_tick("INFY", *price, t0() + Duration::seconds(i as i64 + 1)).unwrap();
            assert!(!matches!(outcome, TickOutcome::Closed(_)), "closed at {}", price);
            let stop = pm.get("INFY").unwrap().current_stop;
            assert!(stop >= last_stop);
            last_stop = stop;
        }
        // 0.5% below the 106 high
        assert!((last_stop - 106.0 * 0.995).abs() < 1e-9);
    }

    #[test]
    fn test_short_trailing_stop_never_loosens() {
        let mut pm = manager();
        pm.open(&signal("TCS", Direction::Short, 100.0, 105.0, 50.0), t0()).unwrap();

        let mut last_stop = 105.0;
        for (i, price) in [99.0, 97.0, 97.4, 95.0, 95.4].iter().enumerate() {
            pm.on_tick("TCS", *price, t0() + Duration::seconds(i as i64 + 1)).unwrap();
            let stop = pm.get("TCS").unwrap().current_stop;
            assert!(stop <= last_stop);
            last_stop = stop;
        }
        assert!((last_stop - 95.0 * 1.005).abs() < 1e-9);
    }

    #[test]
    fn test_excursions_are_monotonic() {
        let mut pm = PositionManager::new(PositionParams {
            enable_trailing_stops: false,
            ..Default::default()
        });
        pm.open(&signal("INFY", Direction::Long, 100.0, 90.0, 120.0), t0()).unwrap();

        let mut prev = (0.0, 0.0);
        for price in [101.0, 98.0, 104.0, 95.0, 102.0, 93.0, 110.0] {
            pm.on_tick("INFY", price, t0()).unwrap();
            let pos = pm.get("INFY").unwrap();
            assert!(pos.mfe >= prev.0);
            assert!(pos.mae <= prev.1);
            prev = (pos.mfe, pos.mae);
        }
        assert_eq!(prev, (10.0, -7.0));
        assert_eq!(pm.get("INFY").unwrap().unrealized_pnl, 1000.0);
    }

    #[test]
    fn test_stop_exit_closes_atomically() {
        let mut pm = PositionManager::new(PositionParams {
            enable_trailing_stops: false,
            commission_per_trade: 20.0,
            ..Default::default()
        });
        pm.open(&signal("INFY", Direction::Long, 100.0, 90.0, 120.0), t0()).unwrap();

        let exit_time = t0() + Duration::minutes(45);
        let TickOutcome::Closed(trade) = pm.on_tick("INFY", 89.5, exit_time).unwrap() else {
            panic!("expected close");
        };
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 89.5);
        assert_eq!(trade.gross_pnl, -1050.0);
        assert_eq!(trade.net_pnl, -1070.0);
        assert_eq!(trade.holding_minutes, 45.0);
        assert!(!pm.has_position("INFY"));
        assert_eq!(pm.history().len(), 1);
        assert_eq!(pm.session_pnl(), -1070.0);
        assert!(pm.on_tick("INFY", 80.0, exit_time).is_none());
    }

    #[test]
    fn test_short_target_exit() {
        let mut pm = manager();
        pm.open(&signal("TCS", Direction::Short, 3000.0, 3030.0, 2940.0), t0()).unwrap();
        let TickOutcome::Closed(trade) = pm.on_tick("TCS", 2939.0, t0()).unwrap() else {
            panic!("expected close");
        };
        assert_eq!(trade.exit_reason, ExitReason::Target);
        // 33 units (1000 / 30), 61 points each
        assert_eq!(trade.quantity, 33);
        assert_eq!(trade.gross_pnl, 61.0 * 33.0);
        assert!(trade.is_win());
    }

    #[test]
    fn test_square_off_uses_last_price() {
        let mut pm = manager();
        pm.open(&signal("INFY", Direction::Long, 100.0, 90.0, 120.0), t0()).unwrap();
        pm.open(&signal("TCS", Direction::Short, 3000.0, 3030.0, 2940.0), t0()).unwrap();
        pm.on_tick("INFY", 104.0, t0()).unwrap();

        let trades = pm.square_off_all(t0() + Duration::hours(5));
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::SquareOff));
        let infy = trades.iter().find(|t| t.instrument == "INFY").unwrap();
        assert_eq!(infy.exit_price, 104.0);
        assert_eq!(pm.open_count(), 0);

        assert!(matches!(
            pm.close("INFY", 100.0, ExitReason::SquareOff, t0()),
            Err(PositionError::UnknownPosition { .. })
        ));
    }
}
