//! Order types and the per-account order book.
//!
//! Orders are requests, not positions. A market order fills immediately; limit,
//! stop and stop-limit orders rest as `Pending` until a quote triggers them.
//! Once an order leaves `Pending` it is never modified again.

use crate::quote::QuoteTick;
use crate::types::{AccountId, GroupId, OrderId, OrderSide, PositionId, Price, Timestamp, Volume};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Executes at the current quote.
    Market,
    /// Executes at the limit price or better.
    Limit,
    /// Becomes a market order once the stop price is touched.
    Stop,
    /// Becomes a limit order once the stop price is touched.
    StopLimit,
}

/// Order lifecycle status. everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Order time in force options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Good till cancelled.
    #[default]
    Gtc,
    /// Expires at the next daily reset boundary.
    Day,
    /// Immediate or cancel. a pending order that does not trigger on the next tick is cancelled.
    Ioc,
    /// Fill or kill. no partial fills exist here, so it behaves like IOC.
    Fok,
}

/// How the trigger price should be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Triggers when the execution price is at or above the trigger.
    Above,
    /// Triggers when the execution price is at or below the trigger.
    Below,
}

impl TriggerCondition {
    pub fn is_met(&self, execution_price: Price, trigger_price: Price) -> bool {
        match self {
            TriggerCondition::Above => execution_price >= trigger_price,
            TriggerCondition::Below => execution_price <= trigger_price,
        }
    }

    /// Direction of `level` seen from `reference`.
    pub fn relative_to(reference: Price, level: Price) -> Self {
        if level < reference {
            TriggerCondition::Below
        } else {
            TriggerCondition::Above
        }
    }
}

/// Which bracket of an OCO group a leg belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcoPair {
    Primary,
    Secondary,
}

/// Role of a leg inside its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoLeg {
    pub group_id: GroupId,
    pub pair: OcoPair,
    pub role: LegRole,
}

/// What a caller submits. prices are absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: Volume,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub sl: Option<Price>,
    pub tp: Option<Price>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub comment: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, volume: Volume) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            volume,
            limit_price: None,
            stop_price: None,
            sl: None,
            tp: None,
            time_in_force: TimeInForce::Gtc,
            comment: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, volume: Volume, price: Price) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            ..Self::market(symbol, side, volume)
        }
    }

    pub fn stop(symbol: impl Into<String>, side: OrderSide, volume: Volume, price: Price) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(price),
            ..Self::market(symbol, side, volume)
        }
    }

    pub fn with_protection(mut self, sl: Option<Price>, tp: Option<Price>) -> Self {
        self.sl = sl;
        self.tp = tp;
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Check that the prices this order type needs are present.
    pub fn check_prices(&self) -> Result<(), OrderError> {
        let missing = match self.order_type {
            OrderType::Market => None,
            OrderType::Limit if self.limit_price.is_none() => Some("limit price"),
            OrderType::Stop if self.stop_price.is_none() => Some("stop price"),
            OrderType::StopLimit if self.stop_price.is_none() => Some("stop price"),
            OrderType::StopLimit if self.limit_price.is_none() => Some("limit price"),
            _ => None,
        };
        match missing {
            Some(field) => Err(OrderError::MissingPrice {
                order_type: self.order_type,
                field,
            }),
            None => Ok(()),
        }
    }
}

/// A trading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: Volume,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub sl: Option<Price>,
    pub tp: Option<Price>,
    pub status: OrderStatus,
    pub filled_volume: Decimal,
    pub fill_price: Option<Price>,
    pub position_id: Option<PositionId>,
    pub leg: Option<OcoLeg>,
    pub trigger: Option<(TriggerCondition, Price)>,
    pub time_in_force: TimeInForce,
    pub comment: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    /// Build a pending order from a request that already passed `check_prices`.
    pub fn new(id: OrderId, account_id: AccountId, request: &OrderRequest, timestamp: Timestamp) -> Self {
        let trigger = default_trigger(request.side, request.order_type, request.limit_price, request.stop_price);
        Self {
            id,
            account_id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            volume: request.volume,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            sl: request.sl,
            tp: request.tp,
            status: OrderStatus::Pending,
            filled_volume: Decimal::ZERO,
            fill_price: None,
            position_id: None,
            leg: None,
            trigger,
            time_in_force: request.time_in_force,
            comment: request.comment.clone(),
            reject_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Attach this order to an OCO group. the trigger direction is fixed relative to
    /// the quote the bracket was built from.
    pub fn into_leg(mut self, leg: OcoLeg, reference: Price) -> Self {
        let level = match self.order_type {
            OrderType::Limit => self.limit_price,
            _ => self.stop_price,
        };
        if let Some(level) = level {
            self.trigger = Some((TriggerCondition::relative_to(reference, level), level));
        }
        self.leg = Some(leg);
        self
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.leg.map(|l| l.group_id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Price this order would trade against right now: ask for buys, bid for sells.
    pub fn execution_price(&self, tick: &QuoteTick) -> Price {
        match self.side {
            OrderSide::Buy => tick.ask,
            OrderSide::Sell => tick.bid,
        }
    }

    /// Check whether a resting order should execute on this tick.
    pub fn should_trigger(&self, tick: &QuoteTick) -> bool {
        if !self.is_pending() || tick.symbol != self.symbol {
            return false;
        }
        let exec = self.execution_price(tick);
        let Some((condition, level)) = self.trigger else {
            return self.order_type == OrderType::Market;
        };
        if !condition.is_met(exec, level) {
            return false;
        }
        // stop-limit: the stop is touched, the limit must still be reachable
        if self.order_type == OrderType::StopLimit && self.leg.is_none() {
            if let Some(limit) = self.limit_price {
                return limit_condition(self.side).is_met(exec, limit);
            }
        }
        true
    }

    /// Fill price once triggered: limit types trade at their limit, the rest at the quote
    /// moved against the trader by `slippage`.
    pub fn fill_price_for(&self, tick: &QuoteTick, slippage: Decimal) -> Price {
        match (self.order_type, self.limit_price) {
            (OrderType::Limit | OrderType::StopLimit, Some(limit)) => limit,
            _ => market_fill_price(self.side, tick, slippage),
        }
    }

    pub fn fill(&mut self, price: Price, position_id: PositionId, timestamp: Timestamp) -> Result<(), OrderError> {
        self.ensure_pending()?;
        self.status = OrderStatus::Filled;
        self.filled_volume = self.volume.lots();
        self.fill_price = Some(price);
        self.position_id = Some(position_id);
        self.updated_at = timestamp;
        Ok(())
    }

    pub fn cancel(&mut self, timestamp: Timestamp) -> Result<(), OrderError> {
        self.ensure_pending()?;
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>, timestamp: Timestamp) -> Result<(), OrderError> {
        self.ensure_pending()?;
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason.into());
        self.updated_at = timestamp;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), OrderError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(OrderError::NotPending {
                order_id: self.id,
                status: self.status,
            })
        }
    }
}

/// Market execution: buys at ask + slippage, sells at bid - slippage.
pub fn market_fill_price(side: OrderSide, tick: &QuoteTick, slippage: Decimal) -> Price {
    match side {
        OrderSide::Buy => tick.ask.offset(slippage).unwrap_or(tick.ask),
        OrderSide::Sell => tick.bid.offset(-slippage).unwrap_or(tick.bid),
    }
}

fn limit_condition(side: OrderSide) -> TriggerCondition {
    match side {
        OrderSide::Buy => TriggerCondition::Below,
        OrderSide::Sell => TriggerCondition::Above,
    }
}

fn stop_condition(side: OrderSide) -> TriggerCondition {
    match side {
        OrderSide::Buy => TriggerCondition::Above,
        OrderSide::Sell => TriggerCondition::Below,
    }
}

fn default_trigger(
    side: OrderSide,
    order_type: OrderType,
    limit_price: Option<Price>,
    stop_price: Option<Price>,
) -> Option<(TriggerCondition, Price)> {
    match order_type {
        OrderType::Market => None,
        OrderType::Limit => limit_price.map(|p| (limit_condition(side), p)),
        OrderType::Stop | OrderType::StopLimit => stop_price.map(|p| (stop_condition(side), p)),
    }
}

/// One account's orders, kept in submission order.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Drop an order that was never exposed to callers. only used to unwind a
    /// group that failed part-way through creation.
    pub fn discard(&mut self, id: OrderId) -> Option<Order> {
        self.orders.remove(&id)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    /// Pending orders for a symbol, oldest first.
    pub fn pending_for_symbol(&self, symbol: &str) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.is_pending() && o.symbol == symbol)
            .map(|o| o.id)
            .collect()
    }

    pub fn pending_ids(&self) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.is_pending())
            .map(|o| o.id)
            .collect()
    }

    /// Orders sharing a group id, in creation order.
    pub fn group(&self, group_id: GroupId) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|o| o.group_id() == Some(group_id))
            .collect()
    }

    /// Distinct group ids, oldest first.
    pub fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = Vec::new();
        for order in self.orders.values() {
            if let Some(id) = order.group_id() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<OrderStatus>) -> Vec<Order> {
        self.orders
            .values()
            .rev()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order {order_id} is {status:?}, only pending orders can change")]
    NotPending { order_id: OrderId, status: OrderStatus },

    #[error("{order_type:?} order requires a {field}")]
    MissingPrice {
        order_type: OrderType,
        field: &'static str,
    },
}
