//! Position management: protective levels, closes and forced liquidation.

use super::core::{AccountBook, Engine};
use super::results::{EngineError, LiquidationReport, PositionFailure};
use crate::events::{EventPayload, PositionClosedEvent};
use crate::position::{CloseReason, Position, ProtectionUpdate};
use crate::trade::{record_trade, Trade};
use crate::types::{AccountId, Money, PositionId, Price, Timestamp};
use tracing::{info, warn};

impl Engine {
    /// Overwrite SL and/or TP of an open position.
    pub fn modify_position(
        &self,
        account_id: AccountId,
        position_id: PositionId,
        update: ProtectionUpdate,
    ) -> Result<Position, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let position = book.ledger.modify(position_id, update, self.time())?.clone();
            self.emit(
                account_id,
                EventPayload::PositionModified {
                    position_id,
                    sl: position.sl,
                    tp: position.tp,
                },
            );
            Ok(position)
        })
    }

    /// Close one position at its current mark. the profit becomes realized.
    pub fn close_position(&self, account_id: AccountId, position_id: PositionId) -> Result<Trade, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let now = self.time();
            let position = book.ledger.get(position_id)?;
            if !position.is_open() {
                return Err(EngineError::PositionNotOpen(position_id));
            }
            let tick = self.fresh_quote(&position.symbol, now)?;
            let price = position.mark_price(&tick);

            let trade = self.close_and_record(book, position_id, price, CloseReason::Manual, now)?;
            self.settle(book, now);
            Ok(trade)
        })
    }

    /// Close every open position, in open order. positions whose quote is missing
    /// stay open and are reported; calling again retries only those.
    pub fn close_all_positions(&self, account_id: AccountId) -> Result<LiquidationReport, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let now = self.time();
            let report = self.liquidate(book, CloseReason::Manual, now);
            self.settle(book, now);
            Ok(report)
        })
    }

    pub(super) fn close_and_record(
        &self,
        book: &mut AccountBook,
        position_id: PositionId,
        price: Price,
        reason: CloseReason,
        now: Timestamp,
    ) -> Result<Trade, EngineError> {
        let closed = book.ledger.close(position_id, price, reason, now)?;
        let trade = self.record_close(book, &closed, now);
        book.recompute(now);
        Ok(trade)
    }

    pub(super) fn liquidate(&self, book: &mut AccountBook, reason: CloseReason, now: Timestamp) -> LiquidationReport {
        let account_id = book.account.id;
        let outcome = book.ledger.close_all(reason, now, |position| {
            self.fresh_quote(&position.symbol, now)
                .map(|tick| position.mark_price(&tick))
        });

        let mut report = LiquidationReport {
            account_id: Some(account_id),
            ..LiquidationReport::default()
        };
        for closed in &outcome.closed {
            let trade = self.record_close(book, closed, now);
            report.trades.push(trade);
        }
        report.realized = report.trades.iter().map(|t| t.profit).sum::<Money>();

        for (position_id, error) in outcome.failures {
            warn!(%account_id, %position_id, %error, "position left open during close-all");
            report.failures.push(PositionFailure { position_id, error });
        }

        book.recompute(now);
        if !report.trades.is_empty() {
            info!(
                %account_id,
                ?reason,
                closed = report.trades.len(),
                failed = report.failures.len(),
                realized = %report.realized,
                "positions closed"
            );
        }
        report
    }

    // the one place realized profit reaches the balance
    fn record_close(&self, book: &mut AccountBook, closed: &Position, now: Timestamp) -> Trade {
        let reason = closed.close_reason.unwrap_or(CloseReason::Manual);
        let trade = record_trade(self.next_trade_id(), closed, closed.current_price, reason, now);
        book.account.realize(trade.profit);
        book.trades.append(trade.clone());

        info!(
            account_id = %book.account.id,
            position_id = %closed.id,
            symbol = %closed.symbol,
            price = %trade.close_price,
            profit = %trade.profit,
            ?reason,
            "position closed"
        );
        self.emit(
            book.account.id,
            EventPayload::PositionClosed(PositionClosedEvent {
                position_id: closed.id,
                trade_id: trade.id,
                symbol: closed.symbol.clone(),
                close_price: trade.close_price,
                profit: trade.profit,
                reason,
            }),
        );
        trade
    }
}
