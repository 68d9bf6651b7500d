//! Error types for the trading core
//!
//! Every variant is local and recoverable: the strategy cycle logs it and
//! carries on with the next instrument or position.

use thiserror::Error;

/// Failures while building a volume profile
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    /// Not enough ticks in the requested window
    #[error("insufficient tick data for {instrument}: {ticks} ticks (need {required})")]
    InsufficientData {
        instrument: String,
        ticks: usize,
        required: usize,
    },

    /// Every tick in the window traded at the same price
    #[error("no price movement for {instrument}: all ticks at {price}")]
    DegenerateRange { instrument: String, price: f64 },
}

/// Refusals when opening or closing a position
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("position already open for {instrument}")]
    DuplicatePosition { instrument: String },

    #[error("maximum positions reached: {max}")]
    SlotExhausted { max: usize },

    /// Risk budget buys less than one unit (or the stop sits on the entry)
    #[error("risk too small for {instrument}: risk budget {risk_budget:.2}, per-unit risk {per_unit_risk:.4}")]
    RiskTooSmall {
        instrument: String,
        risk_budget: f64,
        per_unit_risk: f64,
    },

    #[error("no open position for {instrument}")]
    UnknownPosition { instrument: String },
}

/// Samples the tick store refuses to append
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("invalid tick for {instrument}: price {price}")]
    InvalidTick { instrument: String, price: f64 },
}

/// Invalid strategy configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },

    #[error("high_volume_threshold ({high}) must be greater than low_volume_threshold ({low})")]
    NodeThresholds { high: f64, low: f64 },

    #[error("unknown time zone: {0}")]
    TimeZone(String),
}
