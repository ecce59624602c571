//! Read side of the engine. queries take the account lock but never mutate
//! and keep working after shutdown.

use super::core::{AccountBook, Engine};
use super::results::{AccountSnapshot, EngineError};
use crate::events::Event;
use crate::oco::OcoGroup;
use crate::order::{Order, OrderStatus};
use crate::position::Position;
use crate::quote::QuoteTick;
use crate::risk::{self, RiskCalculation, Violation};
use crate::symbol::Symbol;
use crate::trade::{HistoryFilter, Trade, TradeStats};
use crate::types::{AccountId, GroupId, OrderId, PositionId, Volume};
use rust_decimal::Decimal;

impl Engine {
    fn read<T>(&self, account_id: AccountId, f: impl FnOnce(&AccountBook) -> T) -> Result<T, EngineError> {
        let handle = self.handle(account_id)?;
        let book = handle.lock();
        if book.account.is_archived() {
            return Err(EngineError::AccountNotFound(account_id));
        }
        Ok(f(&book))
    }

    pub fn account_snapshot(&self, account_id: AccountId) -> Result<AccountSnapshot, EngineError> {
        self.read(account_id, AccountBook::snapshot)
    }

    /// Open positions in open order.
    pub fn open_positions(&self, account_id: AccountId) -> Result<Vec<Position>, EngineError> {
        self.read(account_id, |book| book.ledger.open_positions().cloned().collect())
    }

    pub fn position(&self, account_id: AccountId, position_id: PositionId) -> Result<Position, EngineError> {
        self.read(account_id, |book| book.ledger.get(position_id).cloned())?
            .map_err(EngineError::from)
    }

    /// Orders newest first, optionally filtered by status.
    pub fn orders(&self, account_id: AccountId, status: Option<OrderStatus>) -> Result<Vec<Order>, EngineError> {
        self.read(account_id, |book| book.orders.list(status))
    }

    pub fn order(&self, account_id: AccountId, order_id: OrderId) -> Result<Order, EngineError> {
        self.read(account_id, |book| book.orders.get(order_id).cloned())?
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    /// Groups newest first, each with its status derived from the legs.
    pub fn oco_groups(&self, account_id: AccountId) -> Result<Vec<OcoGroup>, EngineError> {
        self.read(account_id, |book| {
            book.orders
                .group_ids()
                .into_iter()
                .rev()
                .filter_map(|id| OcoGroup::from_legs(id, &book.orders.group(id)))
                .collect()
        })
    }

    pub fn oco_group(&self, account_id: AccountId, group_id: GroupId) -> Result<OcoGroup, EngineError> {
        self.read(account_id, |book| OcoGroup::from_legs(group_id, &book.orders.group(group_id)))?
            .ok_or(EngineError::GroupNotFound(group_id))
    }

    pub fn trade_history(&self, account_id: AccountId, filter: &HistoryFilter) -> Result<Vec<Trade>, EngineError> {
        self.read(account_id, |book| book.trades.history(filter))
    }

    pub fn trade_stats(&self, account_id: AccountId) -> Result<TradeStats, EngineError> {
        self.read(account_id, |book| book.trades.stats())
    }

    /// Recorded rule violations, oldest first.
    pub fn violations(&self, account_id: AccountId) -> Result<Vec<Violation>, EngineError> {
        self.read(account_id, |book| book.violations.clone())
    }

    /// Sizing figures for a prospective trade against the account's current free margin.
    pub fn calculate_risk(
        &self,
        account_id: AccountId,
        symbol: &str,
        volume: Volume,
        sl_pips: Option<Decimal>,
    ) -> Result<RiskCalculation, EngineError> {
        let instrument = self.registry.get(symbol)?;
        self.read(account_id, |book| {
            risk::calculate_risk(
                instrument,
                volume,
                sl_pips,
                book.account.free_margin,
                book.account.equity,
                self.config.margin_per_lot,
            )
        })
    }

    /// The last `count` events across all accounts, oldest first.
    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.events.recent(count)
    }

    pub fn account_events(&self, account_id: AccountId) -> Vec<Event> {
        self.events.for_account(account_id)
    }

    /// Latest cached tick, fresh or not.
    pub fn last_quote(&self, symbol: &str) -> Option<QuoteTick> {
        self.quotes.last_known(symbol)
    }

    pub fn symbols(&self) -> Vec<&Symbol> {
        self.registry.available()
    }
}
