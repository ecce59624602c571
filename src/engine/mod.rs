// 8.0: challenge engine. coordinates order execution, position management,
// quote intake and risk settlement for every account.
// deterministic given its inputs: time only moves through set_time and quote ticks.

mod config;
mod core;
mod orders;
mod positions;
mod pricing;
mod queries;
mod results;

pub use config::{ConfigError, DailyResetConfig, EngineConfig};
pub use core::{AccountBook, Engine};
pub use results::{
    AccountSnapshot, EngineError, ErrorCode, LiquidationReport, OcoResult, OrderResult, PositionFailure, QuoteReport,
};
