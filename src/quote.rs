// Quote Feed Integration
//
// The core never owns the price feed. Whatever produces ticks (a simulated
// generator, a broker bridge) pushes them in; the book keeps the latest tick
// per symbol and answers lookups, failing fast when nothing fresh is there.

use crate::types::{Price, Timestamp};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A bid/ask snapshot for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub symbol: String,
    pub bid: Price,
    pub ask: Price,
    pub time: Timestamp,
}

impl QuoteTick {
    pub fn new(symbol: impl Into<String>, bid: Price, ask: Price, time: Timestamp) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            ask,
            time,
        }
    }

    pub fn spread(&self) -> Decimal {
        self.ask.value() - self.bid.value()
    }

    pub fn mid(&self) -> Price {
        Price::new_unchecked((self.bid.value() + self.ask.value()) / dec!(2))
    }

    pub fn is_crossed(&self) -> bool {
        self.bid.value() > self.ask.value()
    }

    pub fn age_ms(&self, now: Timestamp) -> i64 {
        now.as_millis() - self.time.as_millis()
    }
}

/// Why a quote lookup failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("No quote for {0}")]
    Missing(String),

    #[error("Quote for {symbol} is {age_ms}ms old (max {max_age_ms}ms)")]
    Stale {
        symbol: String,
        age_ms: i64,
        max_age_ms: i64,
    },

    #[error("Crossed quote for {symbol}: bid {bid} > ask {ask}")]
    Crossed { symbol: String, bid: Price, ask: Price },
}

/// Latest tick per symbol. shared between the feed writer and account workers.
#[derive(Debug)]
pub struct QuoteBook {
    latest: DashMap<String, QuoteTick>,
    max_age_ms: i64,
}

impl QuoteBook {
    pub fn new(max_age_ms: i64) -> Self {
        Self {
            latest: DashMap::new(),
            max_age_ms,
        }
    }

    /// Store a tick. crossed ticks and ticks older than the stored one are refused.
    pub fn update(&self, tick: QuoteTick) -> Result<bool, QuoteError> {
        if tick.is_crossed() {
            return Err(QuoteError::Crossed {
                symbol: tick.symbol,
                bid: tick.bid,
                ask: tick.ask,
            });
        }

        let mut entry = self
            .latest
            .entry(tick.symbol.clone())
            .or_insert_with(|| tick.clone());
        if tick.time < entry.time {
            return Ok(false);
        }
        *entry = tick;
        Ok(true)
    }

    /// Latest tick that is no older than the configured staleness window.
    pub fn latest(&self, symbol: &str, now: Timestamp) -> Result<QuoteTick, QuoteError> {
        let tick = self
            .latest
            .get(symbol)
            .map(|t| t.clone())
            .ok_or_else(|| QuoteError::Missing(symbol.to_string()))?;

        let age_ms = tick.age_ms(now);
        if age_ms > self.max_age_ms {
            return Err(QuoteError::Stale {
                symbol: symbol.to_string(),
                age_ms,
                max_age_ms: self.max_age_ms,
            });
        }
        Ok(tick)
    }

    /// Latest tick regardless of age.
    pub fn last_known(&self, symbol: &str) -> Option<QuoteTick> {
        self.latest.get(symbol).map(|t| t.clone())
    }

    pub fn clear(&self) {
        self.latest.clear();
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
