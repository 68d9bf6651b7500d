//! Configuration for the volume profile breakout strategy

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::trading_core::{PositionParams, ProfileParams, SignalParams};

/// Which ticks a profile is built from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfilePeriod {
    /// Every tick since the session started
    Session,
    /// Ticks from the last N minutes
    Rolling { minutes: u32 },
}

impl Default for ProfilePeriod {
    fn default() -> Self {
        Self::Session
    }
}

impl std::fmt::Display for ProfilePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "Session"),
            Self::Rolling { minutes } => write!(f, "Rolling({}m)", minutes),
        }
    }
}

/// Read-only strategy settings, supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    // Volume profile
    /// Number of price buckets between the window low and high
    pub price_buckets: usize,
    /// Share of total volume the value area must hold (0-100)
    pub value_area_pct: f64,
    /// Bucket volume at or above this multiple of the average is an HVN
    pub high_volume_threshold: f64,
    /// Bucket volume at or below this multiple of the average is an LVN
    pub low_volume_threshold: f64,
    /// Minimum ticks in the window before a profile can be built
    pub min_ticks: usize,
    pub profile_period: ProfilePeriod,

    // Breakout and signal filters
    pub min_breakout_distance_pct: f64,
    pub min_volume_ratio: f64,
    /// Ticks averaged for the volume ratio baseline
    pub volume_ma_period: usize,
    pub min_poc_distance_pct: f64,
    /// Minimum confidence (0-1) for a signal to be admitted
    pub min_confidence: f64,
    pub require_volume_confirmation: bool,
    pub avoid_low_volume_nodes: bool,
    /// Distance (percent of the node price) that counts as "near" an HVN/LVN
    pub node_proximity_pct: f64,

    // Risk management
    /// Place the stop at POC; otherwise at `stop_loss_pct` from entry
    pub use_poc_as_stop: bool,
    pub stop_loss_pct: f64,
    /// Target distance as a multiple of the stop distance
    pub target_multiplier: f64,
    pub trailing_stop_pct: f64,
    pub enable_trailing_stops: bool,

    // Portfolio
    pub max_positions: usize,
    pub portfolio_value: f64,
    pub risk_per_trade_pct: f64,
    /// Flat commission per round trip
    pub commission_per_trade: f64,
    /// Stop admitting new trades after losing this share of the portfolio in a session
    pub max_daily_loss_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            price_buckets: 50,
            value_area_pct: 70.0,
            high_volume_threshold: 1.5,
            low_volume_threshold: 0.5,
            min_ticks: 10,
            profile_period: ProfilePeriod::Session,
            min_breakout_distance_pct: 0.3,
            min_volume_ratio: 1.5,
            volume_ma_period: 20,
            min_poc_distance_pct: 1.0,
            min_confidence: 0.65,
            require_volume_confirmation: true,
            avoid_low_volume_nodes: true,
            node_proximity_pct: 0.5,
            use_poc_as_stop: true,
            stop_loss_pct: 1.5,
            target_multiplier: 2.0,
            trailing_stop_pct: 0.5,
            enable_trailing_stops: true,
            max_positions: 5,
            portfolio_value: 100_000.0,
            risk_per_trade_pct: 1.0,
            commission_per_trade: 0.0,
            max_daily_loss_pct: 2.0,
        }
    }
}

impl StrategyConfig {
    /// Build the profile builder parameters from the flat config
    pub fn to_profile_params(&self) -> ProfileParams {
        ProfileParams {
            bucket_count: self.price_buckets,
            value_area_pct: self.value_area_pct,
            high_volume_threshold: self.high_volume_threshold,
            low_volume_threshold: self.low_volume_threshold,
            min_ticks: self.min_ticks,
        }
    }

    pub fn to_signal_params(&self) -> SignalParams {
        SignalParams {
            min_poc_distance_pct: self.min_poc_distance_pct,
            min_volume_ratio: self.min_volume_ratio,
            require_volume_confirmation: self.require_volume_confirmation,
            avoid_low_volume_nodes: self.avoid_low_volume_nodes,
            node_proximity_pct: self.node_proximity_pct,
            use_poc_as_stop: self.use_poc_as_stop,
            stop_loss_pct: self.stop_loss_pct,
            target_multiplier: self.target_multiplier,
        }
    }

    pub fn to_position_params(&self) -> PositionParams {
        PositionParams {
            max_positions: self.max_positions,
            portfolio_value: self.portfolio_value,
            risk_per_trade_pct: self.risk_per_trade_pct,
            enable_trailing_stops: self.enable_trailing_stops,
            trailing_stop_pct: self.trailing_stop_pct,
            commission_per_trade: self.commission_per_trade,
        }
    }

    /// Realized session loss that halts new admissions (positive number)
    pub fn max_daily_loss(&self) -> f64 {
        self.portfolio_value * self.max_daily_loss_pct / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(field: &'static str, expected: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
            if ok && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange { field, expected, value })
            }
        }

        check("price_buckets", "at least 1", self.price_buckets as f64, self.price_buckets >= 1)?;
        check(
            "value_area_pct",
            "in (0, 100]",
            self.value_area_pct,
            self.value_area_pct > 0.0 && self.value_area_pct <= 100.0,
        )?;
        check("low_volume_threshold", ">= 0", self.low_volume_threshold, self.low_volume_threshold >= 0.0)?;
        if self.high_volume_threshold <= self.low_volume_threshold {
            return Err(ConfigError::NodeThresholds {
                high: self.high_volume_threshold,
                low: self.low_volume_threshold,
            });
        }
        check("min_ticks", "at least 1", self.min_ticks as f64, self.min_ticks >= 1)?;
        if let ProfilePeriod::Rolling { minutes } = self.profile_period {
            check("profile_period.minutes", "at least 1", minutes as f64, minutes >= 1)?;
        }
        check(
            "min_breakout_distance_pct",
            ">= 0",
            self.min_breakout_distance_pct,
            self.min_breakout_distance_pct >= 0.0,
        )?;
        check("min_volume_ratio", ">= 0", self.min_volume_ratio, self.min_volume_ratio >= 0.0)?;
        check("volume_ma_period", "at least 1", self.volume_ma_period as f64, self.volume_ma_period >= 1)?;
        check("min_poc_distance_pct", ">= 0", self.min_poc_distance_pct, self.min_poc_distance_pct >= 0.0)?;
        check(
            "min_confidence",
            "in [0, 1]",
            self.min_confidence,
            (0.0..=1.0).contains(&self.min_confidence),
        )?;
        check("node_proximity_pct", ">= 0", self.node_proximity_pct, self.node_proximity_pct >= 0.0)?;
        check(
            "stop_loss_pct",
            "in (0, 100)",
            self.stop_loss_pct,
            self.stop_loss_pct > 0.0 && self.stop_loss_pct < 100.0,
        )?;
        check("target_multiplier", "> 0", self.target_multiplier, self.target_multiplier > 0.0)?;
        check(
            "trailing_stop_pct",
            "in [0, 100)",
            self.trailing_stop_pct,
            self.trailing_stop_pct >= 0.0 && self.trailing_stop_pct < 100.0,
        )?;
        check("max_positions", "at least 1", self.max_positions as f64, self.max_positions >= 1)?;
        check("portfolio_value", "> 0", self.portfolio_value, self.portfolio_value > 0.0)?;
        check(
            "risk_per_trade_pct",
            "in (0, 100]",
            self.risk_per_trade_pct,
            self.risk_per_trade_pct > 0.0 && self.risk_per_trade_pct <= 100.0,
        )?;
        check("commission_per_trade", ">= 0", self.commission_per_trade, self.commission_per_trade >= 0.0)?;
        check("max_daily_loss_pct", "> 0", self.max_daily_loss_pct, self.max_daily_loss_pct > 0.0)?;

        Ok(())
    }
}
