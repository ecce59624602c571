//! Instrument reference data.
//!
//! A symbol describes how lots and pips convert into account currency. The
//! registry is loaded once at startup and never mutated afterwards.

use crate::types::{Money, Price, Volume};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Instrument class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Forex,
    Crypto,
    Indices,
    Commodities,
}

/// Static symbol metadata (immutable after load)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: u32,
    /// Ticker (e.g., "EURUSD")
    pub ticker: String,
    pub name: String,
    pub class: InstrumentClass,
    /// Smallest meaningful price increment
    pub pip_size: Decimal,
    /// Units of base per lot
    pub lot_size: Decimal,
    pub min_lot: Decimal,
    pub max_lot: Decimal,
    /// Minimum price increment
    pub tick_size: Decimal,
    pub swap_long: Decimal,
    pub swap_short: Decimal,
    pub trading_hours: String,
    pub available: bool,
}

impl Symbol {
    #[allow(clippy::too_many_arguments)]
    fn seed(
        id: u32,
        ticker: &str,
        name: &str,
        class: InstrumentClass,
        pip_size: Decimal,
        lot_size: Decimal,
        min_lot: Decimal,
        max_lot: Decimal,
        tick_size: Decimal,
        swaps: (Decimal, Decimal),
        trading_hours: &str,
    ) -> Self {
        Self {
            id,
            ticker: ticker.to_string(),
            name: name.to_string(),
            class,
            pip_size,
            lot_size,
            min_lot,
            max_lot,
            tick_size,
            swap_long: swaps.0,
            swap_short: swaps.1,
            trading_hours: trading_hours.to_string(),
            available: true,
        }
    }

    /// Check the requested lots against min/max.
    pub fn validate_volume(&self, volume: Volume) -> Result<(), SymbolError> {
        let lots = volume.lots();
        if lots < self.min_lot || lots > self.max_lot {
            return Err(SymbolError::VolumeOutOfRange {
                volume: lots,
                min: self.min_lot,
                max: self.max_lot,
            });
        }
        Ok(())
    }

    /// Currency value of one pip move for `volume` lots.
    pub fn pip_value(&self, volume: Volume) -> Money {
        Money::new(volume.lots() * self.lot_size * self.pip_size)
    }

    /// Convert a pip distance into a price distance.
    pub fn pips_to_price(&self, pips: Decimal) -> Decimal {
        pips * self.pip_size
    }

    /// Round a price to the nearest tick.
    pub fn round_to_tick(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        let ticks = (price.value() / self.tick_size).round();
        Price::new(ticks * self.tick_size).unwrap_or(price)
    }
}

/// Lookup table keyed by ticker.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    symbols: HashMap<String, Symbol>,
}

impl SymbolRegistry {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|s| (s.ticker.clone(), s))
                .collect(),
        }
    }

    /// The instrument list the platform ships with.
    pub fn with_defaults() -> Self {
        use InstrumentClass::*;
        let fx = |id, ticker, name, max_lot, swaps| {
            Symbol::seed(
                id,
                ticker,
                name,
                Forex,
                dec!(0.0001),
                dec!(100000),
                dec!(0.01),
                max_lot,
                dec!(0.00001),
                swaps,
                "24/5",
            )
        };

        Self::new([
            fx(1, "EURUSD", "Euro/US Dollar", dec!(100), (dec!(-6.5), dec!(2.1))),
            fx(2, "GBPUSD", "British Pound/US Dollar", dec!(100), (dec!(-5.2), dec!(1.5))),
            Symbol::seed(3, "USDJPY", "US Dollar/Japanese Yen", Forex, dec!(0.01), dec!(100000), dec!(0.01), dec!(100), dec!(0.001), (dec!(-8.5), dec!(3.2)), "24/5"),
            fx(4, "AUDUSD", "Australian Dollar/US Dollar", dec!(100), (dec!(-3.2), dec!(0.5))),
            fx(5, "USDCAD", "US Dollar/Canadian Dollar", dec!(100), (dec!(-5.8), dec!(2.2))),
            fx(6, "USDCHF", "US Dollar/Swiss Franc", dec!(100), (dec!(-8.2), dec!(4.5))),
            fx(7, "NZDUSD", "New Zealand Dollar/US Dollar", dec!(100), (dec!(-2.8), dec!(0.2))),
            fx(8, "EURGBP", "Euro/British Pound", dec!(50), (dec!(-3.5), dec!(1.8))),
            Symbol::seed(101, "BTCUSD", "Bitcoin/US Dollar", Crypto, dec!(1), dec!(1), dec!(0.01), dec!(10), dec!(0.01), (dec!(-0.05), dec!(-0.05)), "24/7"),
            Symbol::seed(102, "ETHUSD", "Ethereum/US Dollar", Crypto, dec!(0.01), dec!(1), dec!(0.1), dec!(50), dec!(0.001), (dec!(-0.05), dec!(-0.05)), "24/7"),
            Symbol::seed(201, "SPX500", "S&P 500", Indices, dec!(0.1), dec!(50), dec!(0.1), dec!(20), dec!(0.01), (dec!(-15.5), dec!(-8.2)), "23:00-22:00"),
            Symbol::seed(202, "XAUUSD", "Gold", Commodities, dec!(0.01), dec!(100), dec!(0.01), dec!(50), dec!(0.001), (dec!(-12.5), dec!(-8.2)), "23:00-22:00"),
            Symbol::seed(203, "XAGUSD", "Silver", Commodities, dec!(0.001), dec!(5000), dec!(0.1), dec!(100), dec!(0.0001), (dec!(-8.5), dec!(-5.2)), "23:00-22:00"),
        ])
    }

    /// Available symbol by ticker.
    pub fn get(&self, ticker: &str) -> Result<&Symbol, SymbolError> {
        match self.symbols.get(ticker) {
            Some(symbol) if symbol.available => Ok(symbol),
            _ => Err(SymbolError::Unknown(ticker.to_string())),
        }
    }

    /// Mark a symbol as unavailable. only meant for startup configuration.
    pub fn set_available(&mut self, ticker: &str, available: bool) {
        if let Some(symbol) = self.symbols.get_mut(ticker) {
            symbol.available = available;
        }
    }

    /// Available symbols sorted by class then ticker.
    pub fn available(&self) -> Vec<&Symbol> {
        let mut list: Vec<&Symbol> = self.symbols.values().filter(|s| s.available).collect();
        list.sort_by(|a, b| {
            (a.class as u8, a.ticker.as_str()).cmp(&(b.class as u8, b.ticker.as_str()))
        });
        list
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SymbolError {
    #[error("Invalid symbol: {0}")]
    Unknown(String),

    #[error("Volume {volume} outside allowed range {min}..={max} lots")]
    VolumeOutOfRange {
        volume: Decimal,
        min: Decimal,
        max: Decimal,
    },
}
