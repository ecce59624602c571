//! Quote intake, marking and risk settlement.

use super::core::{AccountBook, Engine};
use super::results::{EngineError, LiquidationReport, QuoteReport};
use crate::events::{CancelReason, EventPayload};
use crate::position::CloseReason;
use crate::quote::QuoteTick;
use crate::risk;
use crate::types::Timestamp;
use tracing::{debug, info, warn};

/// What a settle pass changed.
#[derive(Debug, Default)]
pub(super) struct SettleOutcome {
    pub rolled: bool,
    pub liquidation: Option<LiquidationReport>,
}

impl Engine {
    /// Latest quote for `symbol` that is fresh at `now`. fails fast, never waits.
    pub(super) fn fresh_quote(&self, symbol: &str, now: Timestamp) -> Result<QuoteTick, EngineError> {
        Ok(self.quotes.latest(symbol, now)?)
    }

    /// Feed entry point. stores the tick, then for every account marks positions,
    /// runs SL/TP and pending-order triggers and re-evaluates risk.
    pub fn on_quote(&self, tick: QuoteTick) -> Result<QuoteReport, EngineError> {
        self.ensure_running()?;
        self.registry.get(&tick.symbol)?;

        if !self.quotes.update(tick.clone())? {
            debug!(symbol = %tick.symbol, time = tick.time.as_millis(), "out of order tick ignored");
            return Ok(QuoteReport::default());
        }
        let now = self.advance_time_to(tick.time);

        let mut report = QuoteReport::default();
        for handle in self.handles() {
            let mut book = handle.lock();
            if book.account.is_archived() {
                continue;
            }
            self.apply_tick(&mut book, &tick, now, &mut report);
        }
        Ok(report)
    }

    fn apply_tick(&self, book: &mut AccountBook, tick: &QuoteTick, now: Timestamp, report: &mut QuoteReport) {
        let marked = book.ledger.mark_to_market(tick);
        if marked > 0 {
            report.accounts_marked += 1;
            report.positions_marked += marked;
            book.recompute(now);
        }

        for (position_id, reason) in book.ledger.protection_hits(&tick.symbol) {
            let Ok(price) = book.ledger.get(position_id).map(|p| p.current_price) else {
                continue;
            };
            match self.close_and_record(book, position_id, price, reason, now) {
                Ok(trade) => report.protective_closes.push(trade),
                Err(err) => warn!(account_id = %book.account.id, %position_id, %err, "protective close failed"),
            }
        }

        if book.account.can_trade() {
            self.process_pending(book, tick, now, report);
        }

        if let Some(liquidation) = self.settle(book, now).liquidation {
            report.breaches.push(liquidation);
        }
    }

    // 8.3: roll the day, recompute, evaluate rules, liquidate on breach
    pub(super) fn settle(&self, book: &mut AccountBook, now: Timestamp) -> SettleOutcome {
        let account_id = book.account.id;
        let mut outcome = SettleOutcome::default();

        if risk::roll_daily_period(&mut book.account, &self.config.daily_reset, now) {
            outcome.rolled = true;
            let anchor_equity = book.account.day_anchor_equity;
            debug!(%account_id, %anchor_equity, "daily period rolled");
            self.emit(account_id, EventPayload::DailyReset { anchor_equity });
            self.expire_day_orders(book, now);
        }

        book.recompute(now);
        let evaluation = risk::evaluate(&mut book.account, now);

        if let Some(violation) = evaluation.daily_warning {
            warn!(
                %account_id,
                drawdown = %violation.value,
                limit = %violation.limit,
                "daily drawdown limit exceeded"
            );
            self.emit(
                account_id,
                EventPayload::DrawdownWarning {
                    kind: violation.kind,
                    drawdown: violation.value,
                    limit: violation.limit,
                },
            );
            book.violations.push(violation);
        }

        if evaluation.target_reached {
            info!(%account_id, profit = %book.account.profit, "profit target reached");
            self.emit(
                account_id,
                EventPayload::ProfitTargetReached {
                    profit: book.account.profit,
                    target: book.account.profit_target,
                },
            );
        }

        if let Some(violation) = evaluation.breach {
            warn!(
                %account_id,
                drawdown = %violation.value,
                limit = %violation.limit,
                "account breached"
            );
            self.emit(
                account_id,
                EventPayload::AccountBreached {
                    drawdown: violation.value,
                    limit: violation.limit,
                },
            );
            book.violations.push(violation);

            let mut liquidation = self.liquidate(book, CloseReason::Breach, now);
            liquidation.cancelled_orders = self.cancel_pending(book, CancelReason::Breach, now);
            outcome.liquidation = Some(liquidation);
        }

        outcome
    }
}
