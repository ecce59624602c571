//! Pre-trade checks.
//!
//! Every order, OCO leg included, passes through here before it is stored or
//! filled: symbol lookup, volume range, price completeness, then margin.

use crate::order::{OrderError, OrderRequest};
use crate::symbol::{Symbol, SymbolError, SymbolRegistry};
use crate::types::{Money, Volume};
use rust_decimal::Decimal;

/// Flat per-lot margin.
pub fn margin_required(volume: Volume, margin_per_lot: Decimal) -> Money {
    Money::new(volume.lots() * margin_per_lot)
}

/// Price distance of `ticks` ticks on this symbol.
pub fn slippage(symbol: &Symbol, ticks: u32) -> Decimal {
    symbol.tick_size * Decimal::from(ticks)
}

/// An accepted order and what it will reserve.
#[derive(Debug, Clone)]
pub struct Accepted<'a> {
    pub symbol: &'a Symbol,
    pub margin_required: Money,
}

#[derive(Debug, Clone)]
pub struct OrderValidator<'a> {
    registry: &'a SymbolRegistry,
    margin_per_lot: Decimal,
}

impl<'a> OrderValidator<'a> {
    pub fn new(registry: &'a SymbolRegistry, margin_per_lot: Decimal) -> Self {
        Self {
            registry,
            margin_per_lot,
        }
    }

    /// Static checks that do not depend on account state.
    pub fn check_request(&self, request: &OrderRequest) -> Result<&'a Symbol, ValidationError> {
        let symbol = self.registry.get(&request.symbol)?;
        symbol.validate_volume(request.volume)?;
        request.check_prices()?;
        Ok(symbol)
    }

    pub fn check_margin(&self, volume: Volume, free_margin: Money) -> Result<Money, ValidationError> {
        let required = margin_required(volume, self.margin_per_lot);
        if required > free_margin {
            return Err(ValidationError::InsufficientMargin {
                required,
                available: free_margin,
            });
        }
        Ok(required)
    }

    pub fn validate(&self, request: &OrderRequest, free_margin: Money) -> Result<Accepted<'a>, ValidationError> {
        let symbol = self.check_request(request)?;
        let margin_required = self.check_margin(request.volume, free_margin)?;
        Ok(Accepted {
            symbol,
            margin_required,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Money, available: Money },
}
