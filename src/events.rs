// 11.0: every state change produces an event. used for audit trails and for
// notifying whatever sits above the core. the EventPayload enum lists all event types.
// the log is a bounded ring; the oldest events fall off once max_events is reached.

use crate::account::Phase;
use crate::order::{OrderType, TimeInForce};
use crate::position::CloseReason;
use crate::risk::ViolationKind;
use crate::types::{AccountId, GroupId, Money, OrderId, OrderSide, PositionId, Price, Side, Timestamp, TradeId, Volume};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub account_id: AccountId,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // Order events
    OrderPlaced(OrderPlacedEvent),
    OrderFilled(OrderFilledEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderRejected { order_id: OrderId, reason: String },

    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionModified {
        position_id: PositionId,
        sl: Option<Price>,
        tp: Option<Price>,
    },
    PositionClosed(PositionClosedEvent),

    // Account events
    AccountOpened { user_id: String, starting_balance: Money },
    AccountArchived,
    PhaseAdvanced { from: Phase, to: Phase },
    DailyReset { anchor_equity: Money },

    // Risk events
    AccountBreached { drawdown: Decimal, limit: Decimal },
    DrawdownWarning { kind: ViolationKind, drawdown: Decimal, limit: Decimal },
    ProfitTargetReached { profit: Money, target: Money },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: Volume,
    pub price: Option<Price>,
    pub group_id: Option<GroupId>,
    pub time_in_force: TimeInForce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub symbol: String,
    pub price: Price,
    pub volume: Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserRequested,
    /// Sibling leg of an OCO pair filled
    OcoSiblingFilled,
    /// Sibling leg of an OCO pair was cancelled by the user
    OcoSiblingCancelled,
    Expired,
    /// IOC/FOK order that did not trigger on its first tick
    NotImmediatelyFillable,
    Breach,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub volume: Volume,
    pub open_price: Price,
    pub margin: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub trade_id: TradeId,
    pub symbol: String,
    pub close_price: Price,
    pub profit: Money,
    pub reason: CloseReason,
}

/// Bounded in-memory event log. never held while an account lock is being taken.
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<VecDeque<Event>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, account_id: AccountId, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(event_id = id.0, %account_id, ?payload, "event");

        let mut events = self.events.lock();
        events.push_back(Event {
            id,
            timestamp,
            account_id,
            payload,
        });
        while events.len() > self.capacity {
            events.pop_front();
        }
        id
    }

    /// The last `count` events, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Event> {
        let events = self.events.lock();
        let start = events.len().saturating_sub(count);
        events.iter().skip(start).cloned().collect()
    }

    pub fn for_account(&self, account_id: AccountId) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
