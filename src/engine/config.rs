//! Engine configuration options.

use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When the trading day rolls over for daily drawdown purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyResetConfig {
    /// Local hour of the boundary (0..=23)
    pub hour: u32,
    /// Offset of the reference timezone from UTC in minutes
    pub utc_offset_minutes: i32,
}

impl Default for DailyResetConfig {
    fn default() -> Self {
        // 17:00 New York (EST)
        Self {
            hour: 17,
            utc_offset_minutes: -300,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Flat margin reserved per lot, in account currency.
    pub margin_per_lot: Decimal,
    /// Market fills move this many ticks against the trader.
    pub slippage_ticks: u32,
    /// Quotes older than this are treated as unavailable.
    pub max_quote_age_ms: i64,
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    pub daily_reset: DailyResetConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            margin_per_lot: dec!(1000),
            slippage_ticks: 2,
            max_quote_age_ms: 5_000,
            max_events: 100_000,
            daily_reset: DailyResetConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// No slippage and a tight staleness window.
    pub fn strict() -> Self {
        Self {
            slippage_ticks: 0,
            max_quote_age_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.margin_per_lot <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "margin_per_lot",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_quote_age_ms <= 0 {
            return Err(ConfigError::Invalid {
                field: "max_quote_age_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid {
                field: "max_events",
                reason: "event log needs room for at least one event".to_string(),
            });
        }
        if self.daily_reset.hour > 23 {
            return Err(ConfigError::Invalid {
                field: "daily_reset.hour",
                reason: format!("{} is not an hour of the day", self.daily_reset.hour),
            });
        }
        if self.daily_reset.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid {
                field: "daily_reset.utc_offset_minutes",
                reason: "offset must be within one day".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
