// Library crate - volume profile breakout strategy core, tick sources and runner

pub mod types;
pub mod error;
pub mod config;
pub mod session;
pub mod trading_core;
pub mod streams;
pub mod runner;

// Re-export commonly used types
pub use types::*;
pub use config::{ProfilePeriod, StrategyConfig};
pub use session::SessionSchedule;
pub use trading_core::{CycleReport, Decision, StrategyCycle, StrategyMetrics, TradeResult};
