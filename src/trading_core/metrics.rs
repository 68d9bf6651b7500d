//! Aggregate strategy metrics
//!
//! Always recomputed from the full trade history rather than accumulated, so
//! a snapshot can never drift from the trades it describes.

use serde::{Deserialize, Serialize};

use super::position::TradeResult;
use crate::types::Direction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with positive net pnl
    pub win_rate: f64,
    pub long_trades: usize,
    pub short_trades: usize,
    pub long_win_rate: f64,
    pub short_win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub total_pnl: f64,
    pub total_commission: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Largest peak-to-trough drop of the cumulative net pnl curve
    pub max_drawdown: f64,
    pub avg_holding_minutes: f64,
    pub avg_poc_distance_pct: f64,
}

impl StrategyMetrics {
    pub fn from_trades(trades: &[TradeResult]) -> Self {
        let total = trades.len();
        if total == 0 {
            return Self::default();
        }

        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.net_pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| !t.is_win()).map(|t| t.net_pnl).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|p| p.abs()).sum();

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (long_trades, long_win_rate) = direction_stats(trades, Direction::Long);
        let (short_trades, short_win_rate) = direction_stats(trades, Direction::Short);

        let mut equity = 0.0_f64;
        let mut peak = 0.0_f64;
        let mut max_drawdown = 0.0_f64;
        for trade in trades {
            equity += trade.net_pnl;
            peak = peak.max(equity);
            max_drawdown = max_drawdown.max(peak - equity);
        }

        Self {
            total_trades: total,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / total as f64 * 100.0,
            long_trades,
            short_trades,
            long_win_rate,
            short_win_rate,
            gross_profit,
            gross_loss,
            total_pnl: trades.iter().map(|t| t.net_pnl).sum(),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            profit_factor,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            max_drawdown,
            avg_holding_minutes: trades.iter().map(|t| t.holding_minutes).sum::<f64>() / total as f64,
            avg_poc_distance_pct: trades.iter().map(|t| t.distance_from_poc_pct).sum::<f64>() / total as f64,
        }
    }
}

fn direction_stats(trades: &[TradeResult], direction: Direction) -> (usize, f64) {
    let (count, wins) = trades
        .iter()
        .filter(|t| t.direction == direction)
        .fold((0usize, 0usize), |(n, w), t| (n + 1, w + t.is_win() as usize));
    let rate = if count > 0 { wins as f64 / count as f64 * 100.0 } else { 0.0 };
    (count, rate)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
