//! Trading Core - volume profile breakout strategy
//!
//! This module contains the strategy components, leaves first:
//! - Per-instrument tick buffers
//! - Volume profile construction (POC, value area, HVN/LVN)
//! - One-shot value-area breakout detection
//! - Signal filtering and confidence scoring
//! - Position sizing, trailing stops and exits
//! - Aggregate metrics over the trade history
//! - Cycle orchestration

pub mod ticks;
pub mod profile;
pub mod breakout;
pub mod signal;
pub mod position;
pub mod metrics;
pub mod cycle;

// Re-export commonly used types
pub use ticks::TickStore;
pub use profile::{ProfileBuilder, ProfileParams, VolumeProfile};
pub use breakout::{BreakoutDetector, BreakoutEvent, BreakoutSide};
pub use signal::{ConfidenceBreakdown, Rejection, Signal, SignalEvaluator, SignalParams};
pub use position::{position_size, Position, PositionManager, PositionParams, TickOutcome, TradeResult};
pub use metrics::StrategyMetrics;
pub use cycle::{CycleReport, Decision, StrategyCycle};
