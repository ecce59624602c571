//! Order management and execution.

use super::core::{AccountBook, Engine};
use super::results::{EngineError, OcoResult, OrderResult, QuoteReport};
use crate::events::{CancelReason, EventPayload, OrderCancelledEvent, OrderFilledEvent, OrderPlacedEvent, PositionOpenedEvent};
use crate::oco::{self, Bracket, LegTemplate, OcoGroup, OcoOcoRequest, OcoRequest};
use crate::order::{market_fill_price, OcoLeg, OcoPair, Order, OrderRequest, OrderType, TimeInForce};
use crate::position::{OpenPosition, Position};
use crate::quote::QuoteTick;
use crate::symbol::Symbol;
use crate::types::{AccountId, GroupId, OrderId, OrderSide, Price, Timestamp};
use crate::validator::{margin_required, slippage, OrderValidator};
use tracing::{debug, info};

impl Engine {
    fn validator(&self) -> OrderValidator<'_> {
        OrderValidator::new(&self.registry, self.config.margin_per_lot)
    }

    /// Submit a single order. market orders fill at once against the current quote;
    /// the other types rest as pending. a rejected submission leaves nothing behind.
    pub fn submit_order(&self, account_id: AccountId, request: OrderRequest) -> Result<OrderResult, EngineError> {
        self.ensure_running()?;
        let validator = self.validator();
        let symbol = validator.check_request(&request)?;

        let now = self.time();
        let tick = match request.order_type {
            OrderType::Market => Some(self.fresh_quote(&request.symbol, now)?),
            _ => None,
        };

        self.with_trading_account(account_id, |book| {
            if let Err(err) = validator.check_margin(request.volume, book.account.free_margin) {
                debug!(%account_id, symbol = %request.symbol, %err, "order rejected");
                return Err(err.into());
            }

            let order = Order::new(self.next_order_id(), account_id, &request, now);
            let order_id = order.id;
            book.orders.insert(order);
            self.emit_placed(book, order_id);

            let position = match &tick {
                Some(tick) => {
                    let price = market_fill_price(request.side, tick, slippage(symbol, self.config.slippage_ticks));
                    let (position, _) = self.fill_order(book, order_id, price, symbol, tick, now)?;
                    Some(position)
                }
                None => None,
            };

            self.settle(book, now);
            let order = book.orders.get(order_id).cloned().ok_or(EngineError::OrderNotFound(order_id))?;
            Ok(OrderResult { order, position })
        })
    }

    /// One stop-loss/take-profit pair around the current quote.
    pub fn submit_oco_order(&self, account_id: AccountId, request: OcoRequest) -> Result<OcoResult, EngineError> {
        let pairs = [(OcoPair::Primary, request.bracket)];
        let template = LegTemplate {
            symbol: &request.symbol,
            side: request.side,
            volume: request.volume,
            time_in_force: request.time_in_force,
            comment: request.comment.as_ref(),
        };
        self.submit_group(account_id, template, &pairs)
    }

    /// Two independent pairs (primary and secondary) under one group id.
    pub fn submit_ocooco_order(&self, account_id: AccountId, request: OcoOcoRequest) -> Result<OcoResult, EngineError> {
        let pairs = request.pairs();
        let template = LegTemplate {
            symbol: &request.symbol,
            side: request.side,
            volume: request.volume,
            time_in_force: request.time_in_force,
            comment: request.comment.as_ref(),
        };
        self.submit_group(account_id, template, &pairs)
    }

    fn submit_group(
        &self,
        account_id: AccountId,
        template: LegTemplate<'_>,
        pairs: &[(OcoPair, Bracket)],
    ) -> Result<OcoResult, EngineError> {
        self.ensure_running()?;
        let symbol = template.symbol;
        let instrument = self.registry.get(symbol)?;
        let now = self.time();
        let tick = self.fresh_quote(symbol, now)?;
        let reference = match template.side {
            OrderSide::Buy => tick.ask,
            OrderSide::Sell => tick.bid,
        };

        self.with_trading_account(account_id, |book| {
            let group_id = self.next_group_id();
            let legs = self.create_legs(book, group_id, instrument, template, pairs, reference, now)?;
            for order_id in &legs {
                self.emit_placed(book, *order_id);
            }
            info!(%account_id, %group_id, %symbol, legs = legs.len(), "oco group placed");

            let orders: Vec<Order> = legs.iter().filter_map(|id| book.orders.get(*id).cloned()).collect();
            let refs: Vec<&Order> = orders.iter().collect();
            let group = OcoGroup::from_legs(group_id, &refs).ok_or(EngineError::GroupNotFound(group_id))?;
            Ok(OcoResult { group, orders })
        })
    }

    // each leg goes through the validator; any failure discards the legs already created
    #[allow(clippy::too_many_arguments)]
    fn create_legs(
        &self,
        book: &mut AccountBook,
        group_id: GroupId,
        symbol: &Symbol,
        template: LegTemplate<'_>,
        pairs: &[(OcoPair, Bracket)],
        reference: Price,
        now: Timestamp,
    ) -> Result<Vec<OrderId>, EngineError> {
        let validator = self.validator();
        let account_id = book.account.id;
        let mut created: Vec<OrderId> = Vec::new();

        for (pair, bracket) in pairs {
            let Some(prices) = bracket.prices(template.side, reference, symbol.pip_size) else {
                self.discard_legs(book, &created);
                return Err(EngineError::GroupCreationFailed {
                    leg: created.len(),
                    reason: format!("{pair:?} bracket puts a level at or below zero or on the wrong side of {reference}"),
                });
            };

            for (role, request) in oco::leg_requests(template, bracket, prices) {
                if let Err(err) = validator.validate(&request, book.account.free_margin) {
                    let leg = created.len();
                    self.discard_legs(book, &created);
                    debug!(%account_id, %group_id, leg, %err, "oco leg rejected, group rolled back");
                    return Err(EngineError::GroupCreationFailed {
                        leg,
                        reason: EngineError::from(err).to_string(),
                    });
                }
                let leg = OcoLeg {
                    group_id,
                    pair: *pair,
                    role,
                };
                let order = Order::new(self.next_order_id(), account_id, &request, now).into_leg(leg, reference);
                created.push(order.id);
                book.orders.insert(order);
            }
        }
        Ok(created)
    }

    fn discard_legs(&self, book: &mut AccountBook, created: &[OrderId]) {
        for id in created {
            book.orders.discard(*id);
        }
    }

    /// Cancel a pending order. cancelling an OCO leg also cancels the rest of its pair,
    /// so a plain OCO group ends up cancelled; the other pair of a nested group stays live.
    pub fn cancel_order(&self, account_id: AccountId, order_id: OrderId) -> Result<Order, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let now = self.time();
            let order = book.orders.get_mut(order_id).ok_or(EngineError::OrderNotFound(order_id))?;
            order.cancel(now)?;
            let order = order.clone();
            self.emit(
                account_id,
                EventPayload::OrderCancelled(OrderCancelledEvent {
                    order_id,
                    reason: CancelReason::UserRequested,
                }),
            );

            if let Some(group_id) = order.group_id() {
                let siblings = oco::pair_siblings(book.orders.group(group_id), &order);
                let cancelled = self.cancel_where(book, CancelReason::OcoSiblingCancelled, now, |o| siblings.contains(&o.id));
                debug!(%account_id, %order_id, %group_id, siblings = cancelled.len(), "oco leg cancelled");
            } else {
                debug!(%account_id, %order_id, "order cancelled");
            }
            Ok(order)
        })
    }

    /// Cancel every still-pending leg of a group. returns how many were cancelled;
    /// zero when nothing was pending.
    pub fn cancel_group(&self, account_id: AccountId, group_id: GroupId) -> Result<usize, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            if book.orders.group(group_id).is_empty() {
                return Err(EngineError::GroupNotFound(group_id));
            }
            let cancelled = self.cancel_where(book, CancelReason::UserRequested, self.time(), |order| {
                order.group_id() == Some(group_id)
            });
            Ok(cancelled.len())
        })
    }

    /// Evaluate this account's pending orders on the tick's symbol.
    pub(super) fn process_pending(&self, book: &mut AccountBook, tick: &QuoteTick, now: Timestamp, report: &mut QuoteReport) {
        let account_id = book.account.id;
        for order_id in book.orders.pending_for_symbol(&tick.symbol) {
            let Some(order) = book.orders.get(order_id) else {
                continue;
            };
            // an earlier fill on this tick may have cancelled it
            if !order.is_pending() {
                continue;
            }

            if order.should_trigger(tick) {
                match self.trigger_order(book, order_id, tick, now) {
                    Ok(cancelled) => {
                        report.orders_filled.push(order_id);
                        report.orders_cancelled.extend(cancelled);
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        if let Some(order) = book.orders.get_mut(order_id) {
                            if order.reject(reason.clone(), now).is_ok() {
                                debug!(%account_id, %order_id, %reason, "triggered order rejected");
                                self.emit(account_id, EventPayload::OrderRejected { order_id, reason });
                                report.orders_rejected.push(order_id);
                            }
                        }
                    }
                }
            } else if matches!(order.time_in_force, TimeInForce::Ioc | TimeInForce::Fok) {
                let cancelled = self.cancel_where(book, CancelReason::NotImmediatelyFillable, now, |o| o.id == order_id);
                report.orders_cancelled.extend(cancelled);
            }
        }
    }

    // re-validates margin at trigger time; the caller rejects the order on error
    fn trigger_order(&self, book: &mut AccountBook, order_id: OrderId, tick: &QuoteTick, now: Timestamp) -> Result<Vec<OrderId>, EngineError> {
        let order = book.orders.get(order_id).ok_or(EngineError::OrderNotFound(order_id))?;
        let symbol = self.registry.get(&order.symbol)?;
        let volume = order.volume;
        let price = order.fill_price_for(tick, slippage(symbol, self.config.slippage_ticks));

        book.recompute(now);
        self.validator().check_margin(volume, book.account.free_margin)?;
        let (_, cancelled) = self.fill_order(book, order_id, price, symbol, tick, now)?;
        Ok(cancelled)
    }

    /// Fill a pending order at `price`: open its position, mark it against `tick`,
    /// and cancel the rest of its OCO pair. returns the position and the cancelled siblings.
    fn fill_order(
        &self,
        book: &mut AccountBook,
        order_id: OrderId,
        price: Price,
        symbol: &Symbol,
        tick: &QuoteTick,
        now: Timestamp,
    ) -> Result<(Position, Vec<OrderId>), EngineError> {
        let account_id = book.account.id;
        let position_id = self.next_position_id();
        let order = book.orders.get_mut(order_id).ok_or(EngineError::OrderNotFound(order_id))?;
        order.fill(price, position_id, now)?;
        let order = order.clone();

        let margin = margin_required(order.volume, self.config.margin_per_lot);
        let position = Position::new(
            position_id,
            OpenPosition {
                account_id,
                order_id,
                symbol: order.symbol.clone(),
                side: order.side.position_side(),
                volume: order.volume,
                lot_size: symbol.lot_size,
                pip_size: symbol.pip_size,
                open_price: price,
                sl: order.sl,
                tp: order.tp,
                margin,
            },
            now,
        );
        book.ledger.open(position);
        book.ledger.mark_to_market(tick);
        book.recompute(now);
        let position = book.ledger.get(position_id)?.clone();

        info!(
            %account_id,
            %order_id,
            %position_id,
            symbol = %order.symbol,
            side = ?position.side,
            volume = %order.volume,
            %price,
            "order filled"
        );
        self.emit(
            account_id,
            EventPayload::OrderFilled(OrderFilledEvent {
                order_id,
                position_id,
                symbol: order.symbol.clone(),
                price,
                volume: order.volume,
            }),
        );
        self.emit(
            account_id,
            EventPayload::PositionOpened(PositionOpenedEvent {
                position_id,
                order_id,
                symbol: order.symbol.clone(),
                side: position.side,
                volume: position.volume,
                open_price: price,
                margin,
            }),
        );

        let cancelled = match order.group_id() {
            Some(group_id) => {
                let siblings = oco::pair_siblings(book.orders.group(group_id), &order);
                self.cancel_where(book, CancelReason::OcoSiblingFilled, now, |o| siblings.contains(&o.id))
            }
            None => Vec::new(),
        };
        Ok((position, cancelled))
    }

    fn emit_placed(&self, book: &AccountBook, order_id: OrderId) {
        let Some(order) = book.orders.get(order_id) else {
            return;
        };
        debug!(account_id = %book.account.id, %order_id, symbol = %order.symbol, "order placed");
        self.emit(
            book.account.id,
            EventPayload::OrderPlaced(OrderPlacedEvent {
                order_id,
                symbol: order.symbol.clone(),
                side: order.side,
                order_type: order.order_type,
                volume: order.volume,
                price: order.limit_price.or(order.stop_price),
                group_id: order.group_id(),
                time_in_force: order.time_in_force,
            }),
        );
    }
}
