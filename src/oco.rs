//! One-cancels-other order groups.
//!
//! A group is not stored on its own. Its legs are ordinary orders sharing a
//! group id, and the group status is derived from those legs every time it is
//! read, so it can never drift from them.
//!
//! A plain OCO group has one pair of legs (stop-loss side and take-profit side).
//! A nested OCOOCO group has a primary and a secondary pair under one id; a fill
//! resolves only the pair it happened in.

use crate::order::{LegRole, OcoPair, Order, OrderRequest, OrderStatus, OrderType, TimeInForce};
use crate::types::{AccountId, GroupId, OrderId, OrderSide, Price, Volume};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Absolute prices of one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketPrices {
    pub sl: Price,
    pub tp: Price,
}

/// Pip distances of one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipBracket {
    pub sl_pips: Decimal,
    pub tp_pips: Decimal,
}

/// Convert pip offsets into prices around `reference`.
/// long: sl below, tp above. short: mirrored. `None` if a level would not be a valid price.
pub fn bracket_prices(side: OrderSide, reference: Price, bracket: PipBracket, pip_size: Decimal) -> Option<BracketPrices> {
    Some(BracketPrices {
        sl: pip_level(side, LegRole::StopLoss, reference, bracket.sl_pips * pip_size)?,
        tp: pip_level(side, LegRole::TakeProfit, reference, bracket.tp_pips * pip_size)?,
    })
}

fn pip_level(side: OrderSide, role: LegRole, reference: Price, distance: Decimal) -> Option<Price> {
    match (side, role) {
        (OrderSide::Buy, LegRole::StopLoss) | (OrderSide::Sell, LegRole::TakeProfit) => reference.offset(-distance),
        (OrderSide::Buy, LegRole::TakeProfit) | (OrderSide::Sell, LegRole::StopLoss) => reference.offset(distance),
    }
}

/// Order type of the stop-loss leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLegType {
    #[default]
    Stop,
    StopLimit,
}

impl StopLegType {
    pub fn order_type(self) -> OrderType {
        match self {
            StopLegType::Stop => OrderType::Stop,
            StopLegType::StopLimit => OrderType::StopLimit,
        }
    }
}

/// Order type of the take-profit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitLegType {
    #[default]
    Limit,
    StopLimit,
}

impl TakeProfitLegType {
    pub fn order_type(self) -> OrderType {
        match self {
            TakeProfitLegType::Limit => OrderType::Limit,
            TakeProfitLegType::StopLimit => OrderType::StopLimit,
        }
    }
}

/// One stop-loss/take-profit pair as submitted. absolute levels win over the pip offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub pips: PipBracket,
    #[serde(default)]
    pub sl_price: Option<Price>,
    #[serde(default)]
    pub tp_price: Option<Price>,
    #[serde(default)]
    pub sl_order_type: StopLegType,
    #[serde(default)]
    pub tp_order_type: TakeProfitLegType,
}

impl From<PipBracket> for Bracket {
    fn from(pips: PipBracket) -> Self {
        Self {
            pips,
            sl_price: None,
            tp_price: None,
            sl_order_type: StopLegType::default(),
            tp_order_type: TakeProfitLegType::default(),
        }
    }
}

impl Bracket {
    pub fn with_prices(mut self, sl: Option<Price>, tp: Option<Price>) -> Self {
        self.sl_price = sl;
        self.tp_price = tp;
        self
    }

    pub fn with_leg_types(mut self, sl: StopLegType, tp: TakeProfitLegType) -> Self {
        self.sl_order_type = sl;
        self.tp_order_type = tp;
        self
    }

    /// Resolve both levels around `reference`. `None` if a level from pips would not be a
    /// valid price, or an absolute level sits on the wrong side of the reference.
    pub fn prices(&self, side: OrderSide, reference: Price, pip_size: Decimal) -> Option<BracketPrices> {
        let sl = match self.sl_price {
            Some(level) => level,
            None => pip_level(side, LegRole::StopLoss, reference, self.pips.sl_pips * pip_size)?,
        };
        let tp = match self.tp_price {
            Some(level) => level,
            None => pip_level(side, LegRole::TakeProfit, reference, self.pips.tp_pips * pip_size)?,
        };

        // absolute levels must sit on their own side of the reference
        let (sl_ok, tp_ok) = match side {
            OrderSide::Buy => (sl < reference, tp > reference),
            OrderSide::Sell => (sl > reference, tp < reference),
        };
        if (self.sl_price.is_some() && !sl_ok) || (self.tp_price.is_some() && !tp_ok) {
            return None;
        }
        Some(BracketPrices { sl, tp })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Volume,
    pub bracket: Bracket,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub comment: Option<String>,
}

impl OcoRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, volume: Volume, bracket: impl Into<Bracket>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            volume,
            bracket: bracket.into(),
            time_in_force: TimeInForce::Gtc,
            comment: None,
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcoOcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Volume,
    pub primary: Bracket,
    pub secondary: Bracket,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub comment: Option<String>,
}

impl OcoOcoRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        volume: Volume,
        primary: impl Into<Bracket>,
        secondary: impl Into<Bracket>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            volume,
            primary: primary.into(),
            secondary: secondary.into(),
            time_in_force: TimeInForce::Gtc,
            comment: None,
        }
    }

    pub fn pairs(&self) -> [(OcoPair, Bracket); 2] {
        [(OcoPair::Primary, self.primary), (OcoPair::Secondary, self.secondary)]
    }
}

/// Fields every leg of a group shares.
#[derive(Debug, Clone, Copy)]
pub struct LegTemplate<'a> {
    pub symbol: &'a str,
    pub side: OrderSide,
    pub volume: Volume,
    pub time_in_force: TimeInForce,
    pub comment: Option<&'a String>,
}

/// The two order requests that make up one pair. a stop-limit leg rests with its
/// stop and limit on the same level.
pub fn leg_requests(template: LegTemplate<'_>, bracket: &Bracket, prices: BracketPrices) -> [(LegRole, OrderRequest); 2] {
    let base = OrderRequest {
        symbol: template.symbol.to_string(),
        side: template.side,
        order_type: OrderType::Market,
        volume: template.volume,
        limit_price: None,
        stop_price: None,
        sl: None,
        tp: None,
        time_in_force: template.time_in_force,
        comment: template.comment.cloned(),
    };

    let sl_type = bracket.sl_order_type.order_type();
    let tp_type = bracket.tp_order_type.order_type();
    [
        (
            LegRole::StopLoss,
            OrderRequest {
                order_type: sl_type,
                stop_price: Some(prices.sl),
                limit_price: (sl_type == OrderType::StopLimit).then_some(prices.sl),
                ..base.clone()
            },
        ),
        (
            LegRole::TakeProfit,
            OrderRequest {
                order_type: tp_type,
                limit_price: Some(prices.tp),
                stop_price: (tp_type == OrderType::StopLimit).then_some(prices.tp),
                ..base
            },
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// No leg filled and at least one still pending
    Active,
    /// At least one leg filled
    PartiallyFilled,
    /// Every leg ended without a fill. a rejected leg counts as ended, so one
    /// rejected and one cancelled leg resolve to cancelled rather than active.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Oco,
    OcoOco,
}

/// Derive a group's status from its legs.
pub fn resolve_group<'a>(legs: impl IntoIterator<Item = &'a Order>) -> GroupStatus {
    let mut any_pending = false;
    let mut any_filled = false;
    for leg in legs {
        match leg.status {
            OrderStatus::Filled => any_filled = true,
            OrderStatus::Pending => any_pending = true,
            OrderStatus::Cancelled | OrderStatus::Rejected => {}
        }
    }
    if any_filled {
        GroupStatus::PartiallyFilled
    } else if any_pending {
        GroupStatus::Active
    } else {
        GroupStatus::Cancelled
    }
}

/// Pending legs to cancel once `resolved` was filled or cancelled: the rest of its pair.
pub fn pair_siblings<'a>(legs: impl IntoIterator<Item = &'a Order>, resolved: &Order) -> Vec<OrderId> {
    let Some(resolved_leg) = resolved.leg else {
        return Vec::new();
    };
    legs.into_iter()
        .filter(|o| o.id != resolved.id && o.is_pending())
        .filter(|o| o.leg.is_some_and(|l| l.group_id == resolved_leg.group_id && l.pair == resolved_leg.pair))
        .map(|o| o.id)
        .collect()
}

/// Read-only view of a group, rebuilt from its legs on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcoGroup {
    pub id: GroupId,
    pub account_id: AccountId,
    pub symbol: String,
    pub kind: GroupKind,
    pub order_ids: Vec<OrderId>,
    pub status: GroupStatus,
}

impl OcoGroup {
    pub fn from_legs(id: GroupId, legs: &[&Order]) -> Option<Self> {
        let first = legs.first()?;
        let nested = legs
            .iter()
            .any(|o| o.leg.is_some_and(|l| l.pair == OcoPair::Secondary));
        Some(Self {
            id,
            account_id: first.account_id,
            symbol: first.symbol.clone(),
            kind: if nested { GroupKind::OcoOco } else { GroupKind::Oco },
            order_ids: legs.iter().map(|o| o.id).collect(),
            status: resolve_group(legs.iter().copied()),
        })
    }
}
