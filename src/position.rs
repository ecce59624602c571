// 4.0: open position tracking. profit = sign * (mark - open) * volume * lot_size.
// the ledger is the only writer of current_price, profit and profit_percent.
// 4.3 has the close paths at the bottom.

use crate::quote::QuoteTick;
use crate::types::{AccountId, Money, OrderId, PositionId, Price, Side, Timestamp, Volume};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
    Breach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub volume: Volume,
    /// Captured from the symbol at open so marking needs no registry lookup
    pub lot_size: Decimal,
    pub pip_size: Decimal,
    pub open_price: Price,
    pub current_price: Price,
    pub sl: Option<Price>,
    pub tp: Option<Price>,
    pub swap: Money,
    pub commission: Money,
    pub profit: Money,
    pub profit_percent: Decimal,
    pub margin: Money,
    pub status: PositionStatus,
    pub close_price: Option<Price>,
    pub close_reason: Option<CloseReason>,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

/// Everything needed to open a position from a filled order.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub volume: Volume,
    pub lot_size: Decimal,
    pub pip_size: Decimal,
    pub open_price: Price,
    pub sl: Option<Price>,
    pub tp: Option<Price>,
    pub margin: Money,
}

impl Position {
    pub fn new(id: PositionId, params: OpenPosition, timestamp: Timestamp) -> Self {
        Self {
            id,
            account_id: params.account_id,
            order_id: params.order_id,
            symbol: params.symbol,
            side: params.side,
            volume: params.volume,
            lot_size: params.lot_size,
            pip_size: params.pip_size,
            open_price: params.open_price,
            current_price: params.open_price,
            sl: params.sl,
            tp: params.tp,
            swap: Money::zero(),
            commission: Money::zero(),
            profit: Money::zero(),
            profit_percent: Decimal::ZERO,
            margin: params.margin,
            status: PositionStatus::Open,
            close_price: None,
            close_reason: None,
            opened_at: timestamp,
            updated_at: timestamp,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    // 4.1: long marks at ask, short at bid
    pub fn mark_price(&self, tick: &QuoteTick) -> Price {
        match self.side {
            Side::Long => tick.ask,
            Side::Short => tick.bid,
        }
    }

    /// Currency value of one pip for this position's size.
    pub fn pip_value(&self) -> Money {
        Money::new(self.volume.lots() * self.lot_size * self.pip_size)
    }

    pub fn profit_at(&self, price: Price) -> Money {
        calculate_profit(self.side, self.volume, self.lot_size, self.open_price, price)
    }

    /// Which protective level, if any, the current price has crossed.
    pub fn protection_hit(&self) -> Option<CloseReason> {
        if !self.is_open() {
            return None;
        }
        let price = self.current_price;
        let (sl_hit, tp_hit) = match self.side {
            Side::Long => (
                self.sl.is_some_and(|sl| price <= sl),
                self.tp.is_some_and(|tp| price >= tp),
            ),
            Side::Short => (
                self.sl.is_some_and(|sl| price >= sl),
                self.tp.is_some_and(|tp| price <= tp),
            ),
        };
        if sl_hit {
            Some(CloseReason::StopLoss)
        } else if tp_hit {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }

    fn apply_price(&mut self, price: Price) {
        self.current_price = price;
        self.profit = self.profit_at(price);
        self.profit_percent = calculate_profit_percent(self.side, self.open_price, price);
    }
}

// 4.2: priceDiff * pipValue / pipSize collapses to priceDiff * volume * lot_size
pub fn calculate_profit(side: Side, volume: Volume, lot_size: Decimal, open: Price, price: Price) -> Money {
    let diff = side.sign() * (price.value() - open.value());
    Money::new(diff * volume.lots() * lot_size)
}

pub fn calculate_profit_percent(side: Side, open: Price, price: Price) -> Decimal {
    side.sign() * (price.value() - open.value()) / open.value() * dec!(100)
}

/// Pip distance between two prices, signed so a favourable move is positive.
pub fn calculate_pips(side: Side, pip_size: Decimal, open: Price, close: Price) -> Decimal {
    if pip_size.is_zero() {
        return Decimal::ZERO;
    }
    side.sign() * (close.value() - open.value()) / pip_size
}

/// New SL/TP values. `None` leaves the current level untouched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProtectionUpdate {
    pub sl: Option<Price>,
    pub tp: Option<Price>,
}

/// Result of a close-all pass. positions already closed are skipped, not reported.
#[derive(Debug, Clone)]
pub struct CloseAllOutcome<E> {
    pub closed: Vec<Position>,
    pub failures: Vec<(PositionId, E)>,
}

impl<E> CloseAllOutcome<E> {
    pub fn realized(&self) -> Money {
        self.closed.iter().map(|p| p.profit).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Open and closed positions of one account, keyed in open order.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: BTreeMap<PositionId, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, position: Position) -> &Position {
        let id = position.id;
        self.positions.entry(id).or_insert(position)
    }

    pub fn get(&self, id: PositionId) -> Result<&Position, LedgerError> {
        self.positions.get(&id).ok_or(LedgerError::NotFound(id))
    }

    /// Re-mark every open position on the tick's symbol. returns how many were marked.
    /// the same tick always yields the same profit.
    pub fn mark_to_market(&mut self, tick: &QuoteTick) -> usize {
        let mut marked = 0;
        for position in self.positions.values_mut() {
            if position.is_open() && position.symbol == tick.symbol {
                let price = position.mark_price(tick);
                position.apply_price(price);
                position.updated_at = tick.time;
                marked += 1;
            }
        }
        marked
    }

    /// Open positions on `symbol` whose SL or TP is crossed at the current mark.
    pub fn protection_hits(&self, symbol: &str) -> Vec<(PositionId, CloseReason)> {
        self.positions
            .values()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| p.protection_hit().map(|reason| (p.id, reason)))
            .collect()
    }

    pub fn modify(&mut self, id: PositionId, update: ProtectionUpdate, timestamp: Timestamp) -> Result<&Position, LedgerError> {
        let position = self.open_mut(id)?;
        if let Some(sl) = update.sl {
            position.sl = Some(sl);
        }
        if let Some(tp) = update.tp {
            position.tp = Some(tp);
        }
        position.updated_at = timestamp;
        Ok(position)
    }

    // 4.3: final profit uses the same formula as marking. closed exactly once.
    pub fn close(
        &mut self,
        id: PositionId,
        price: Price,
        reason: CloseReason,
        timestamp: Timestamp,
    ) -> Result<Position, LedgerError> {
        let position = self.open_mut(id)?;
        position.apply_price(price);
        position.status = PositionStatus::Closed;
        position.close_price = Some(price);
        position.close_reason = Some(reason);
        position.closed_at = Some(timestamp);
        position.updated_at = timestamp;
        Ok(position.clone())
    }

    /// Close every open position in open order. `price_for` supplies the exit price;
    /// when it fails the position stays open and the failure is reported.
    pub fn close_all<E, F>(&mut self, reason: CloseReason, timestamp: Timestamp, mut price_for: F) -> CloseAllOutcome<E>
    where
        F: FnMut(&Position) -> Result<Price, E>,
    {
        let mut outcome = CloseAllOutcome {
            closed: Vec::new(),
            failures: Vec::new(),
        };
        for id in self.open_ids() {
            let price = match self.positions.get(&id).map(&mut price_for) {
                Some(Ok(price)) => price,
                Some(Err(err)) => {
                    outcome.failures.push((id, err));
                    continue;
                }
                None => continue,
            };
            if let Ok(closed) = self.close(id, price, reason, timestamp) {
                outcome.closed.push(closed);
            }
        }
        outcome
    }

    pub fn open_ids(&self) -> Vec<PositionId> {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.id)
            .collect()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_open())
    }

    pub fn open_count(&self) -> usize {
        self.open_positions().count()
    }

    pub fn used_margin(&self) -> Money {
        self.open_positions().map(|p| p.margin).sum()
    }

    pub fn floating_profit(&self) -> Money {
        self.open_positions().map(|p| p.profit).sum()
    }

    fn open_mut(&mut self, id: PositionId) -> Result<&mut Position, LedgerError> {
        let position = self.positions.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if !position.is_open() {
            return Err(LedgerError::NotOpen(id));
        }
        Ok(position)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Position {0} not found")]
    NotFound(PositionId),

    #[error("Position {0} is not open")]
    NotOpen(PositionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn eurusd(id: u64, side: Side, open: Decimal) -> Position {
        Position::new(
            PositionId(id),
            OpenPosition {
                account_id: AccountId(1),
                order_id: OrderId(id),
                symbol: "EURUSD".to_string(),
                side,
                volume: Volume::new_unchecked(dec!(1)),
                lot_size: dec!(100000),
                pip_size: dec!(0.0001),
                open_price: p(open),
                sl: None,
                tp: None,
                margin: Money::new(dec!(1000)),
            },
            Timestamp::from_millis(0),
        )
    }

    fn tick(bid: Decimal, ask: Decimal) -> QuoteTick {
        QuoteTick::new("EURUSD", p(bid), p(ask), Timestamp::from_millis(1_000))
    }

    #[test]
    fn long_marks_at_ask() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));

        assert_eq!(ledger.mark_to_market(&tick(dec!(1.0868), dec!(1.0870))), 1);
        let pos = ledger.get(PositionId(1)).unwrap();
        assert_eq!(pos.current_price.value(), dec!(1.0870));
        // 20 pips on 1 lot = 200
        assert_eq!(pos.profit.value(), dec!(200));
    }

    #[test]
    fn short_marks_at_bid() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Short, dec!(1.0850)));

        ledger.mark_to_market(&tick(dec!(1.0868), dec!(1.0870)));
        let pos = ledger.get(PositionId(1)).unwrap();
        assert_eq!(pos.current_price.value(), dec!(1.0868));
        assert_eq!(pos.profit.value(), dec!(-180));
        assert!(pos.profit_percent < Decimal::ZERO);
    }

    #[test]
    fn marking_is_idempotent() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));
        let t = tick(dec!(1.0801), dec!(1.0803));

        ledger.mark_to_market(&t);
        let first = ledger.get(PositionId(1)).unwrap().profit;
        ledger.mark_to_market(&t);
        assert_eq!(ledger.get(PositionId(1)).unwrap().profit, first);
    }

    #[test]
    fn other_symbols_untouched() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));
        let other = QuoteTick::new("GBPUSD", p(dec!(1.25)), p(dec!(1.2502)), Timestamp::from_millis(1));
        assert_eq!(ledger.mark_to_market(&other), 0);
    }

    #[test]
    fn close_realizes_once() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));

        let closed = ledger
            .close(PositionId(1), p(dec!(1.0900)), CloseReason::Manual, Timestamp::from_millis(5))
            .unwrap();
        assert_eq!(closed.profit.value(), dec!(500));
        assert_eq!(closed.close_price, Some(p(dec!(1.0900))));
        assert!(ledger.used_margin().is_zero());

        let again = ledger.close(PositionId(1), p(dec!(1.0950)), CloseReason::Manual, Timestamp::from_millis(6));
        assert_eq!(again.unwrap_err(), LedgerError::NotOpen(PositionId(1)));
        assert_eq!(ledger.get(PositionId(1)).unwrap().profit.value(), dec!(500));
    }

    #[test]
    fn modify_rejects_closed_position() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));

        let update = ProtectionUpdate {
            sl: Some(p(dec!(1.0800))),
            tp: None,
        };
        let pos = ledger.modify(PositionId(1), update, Timestamp::from_millis(2)).unwrap();
        assert_eq!(pos.sl, Some(p(dec!(1.0800))));
        assert_eq!(pos.updated_at, Timestamp::from_millis(2));

        ledger
            .close(PositionId(1), p(dec!(1.0850)), CloseReason::Manual, Timestamp::from_millis(3))
            .unwrap();
        assert!(matches!(
            ledger.modify(PositionId(1), update, Timestamp::from_millis(4)),
            Err(LedgerError::NotOpen(_))
        ));
        assert!(matches!(
            ledger.modify(PositionId(9), update, Timestamp::from_millis(4)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn protection_levels_detected() {
        let mut ledger = PositionLedger::new();
        let mut long = eurusd(1, Side::Long, dec!(1.0850));
        long.sl = Some(p(dec!(1.0830)));
        let mut short = eurusd(2, Side::Short, dec!(1.0850));
        short.tp = Some(p(dec!(1.0830)));
        ledger.open(long);
        ledger.open(short);

        ledger.mark_to_market(&tick(dec!(1.0829), dec!(1.0831)));
        assert!(ledger.protection_hits("EURUSD").is_empty());

        ledger.mark_to_market(&tick(dec!(1.0828), dec!(1.0830)));
        let hits = ledger.protection_hits("EURUSD");
        assert_eq!(hits, vec![(PositionId(1), CloseReason::StopLoss), (PositionId(2), CloseReason::TakeProfit)]);
    }

    #[test]
    fn close_all_reports_failures_and_is_rerunnable() {
        let mut ledger = PositionLedger::new();
        ledger.open(eurusd(1, Side::Long, dec!(1.0850)));
        ledger.open(eurusd(2, Side::Short, dec!(1.0850)));

        let outcome = ledger.close_all(CloseReason::Breach, Timestamp::from_millis(9), |pos| {
            if pos.id == PositionId(2) {
                Err("no quote")
            } else {
                Ok(p(dec!(1.0840)))
            }
        });
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.failures, vec![(PositionId(2), "no quote")]);
        assert_eq!(outcome.realized().value(), dec!(-100));

        let retry: CloseAllOutcome<&str> =
            ledger.close_all(CloseReason::Breach, Timestamp::from_millis(10), |_| Ok(p(dec!(1.0840))));
        assert!(retry.is_complete());
        assert_eq!(retry.closed.len(), 1);
        assert_eq!(ledger.open_count(), 0);

        let noop: CloseAllOutcome<&str> =
            ledger.close_all(CloseReason::Breach, Timestamp::from_millis(11), |_| Ok(p(dec!(1.0840))));
        assert!(noop.closed.is_empty());
    }

    #[test]
    fn pips_signed_by_side() {
        let open = p(dec!(1.0850));
        let close = p(dec!(1.0830));
        assert_eq!(calculate_pips(Side::Long, dec!(0.0001), open, close), dec!(-20));
        assert_eq!(calculate_pips(Side::Short, dec!(0.0001), open, close), dec!(20));
    }
}
