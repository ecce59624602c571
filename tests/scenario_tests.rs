//! Scenario tests
//!
//! End-to-end flows through the engine: fills, brackets, drawdown breaches and
//! the account lifecycle. All run on the strict config so prices are exact.

use prop_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// 2025-03-03 14:00:00 UTC (09:00 New York)
const START_MS: i64 = 1_741_010_400_000;

fn engine() -> Engine {
    let engine = Engine::new(EngineConfig::strict(), SymbolRegistry::with_defaults());
    engine.set_time(Timestamp::from_millis(START_MS));
    engine
}

fn open_account(engine: &Engine, starting_balance: Option<Decimal>) -> AccountId {
    engine
        .open_account(OpenAccountRequest {
            user_id: "trader-1".to_string(),
            challenge_type: ChallengeType::Standard,
            starting_balance: starting_balance.map(Money::new),
        })
        .unwrap()
        .account
        .id
}

fn eurusd(bid: Decimal, ask: Decimal, offset_ms: i64) -> QuoteTick {
    QuoteTick::new(
        "EURUSD",
        Price::new_unchecked(bid),
        Price::new_unchecked(ask),
        Timestamp::from_millis(START_MS + offset_ms),
    )
}

fn lots(v: Decimal) -> Volume {
    Volume::new_unchecked(v)
}

fn price(v: Decimal) -> Price {
    Price::new_unchecked(v)
}

fn buy_market(engine: &Engine, account_id: AccountId, volume: Decimal) -> OrderResult {
    engine
        .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(volume)))
        .unwrap()
}

fn bracket(sl_pips: Decimal, tp_pips: Decimal) -> PipBracket {
    PipBracket { sl_pips, tp_pips }
}

fn oco_request(volume: Decimal, sl_pips: Decimal, tp_pips: Decimal) -> OcoRequest {
    OcoRequest::new("EURUSD", OrderSide::Buy, lots(volume), bracket(sl_pips, tp_pips))
}

/// Market fills and pending-order triggering.
mod execution_tests {
    use super::*;

    #[test]
    fn market_buy_fills_at_ask_and_reserves_margin() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let result = buy_market(&engine, account_id, dec!(1));
        assert_eq!(result.order.status, OrderStatus::Filled);
        let position = result.position.unwrap();
        assert_eq!(position.open_price, price(dec!(1.0852)));
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.margin, Money::new(dec!(1000)));

        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.used_margin, Money::new(dec!(1000)));
        assert_eq!(account.free_margin, Money::new(dec!(24000)));
    }

    #[test]
    fn default_config_applies_slippage() {
        let engine = Engine::new(EngineConfig::default(), SymbolRegistry::with_defaults());
        engine.set_time(Timestamp::from_millis(START_MS));
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let sell = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Sell, lots(dec!(1))))
            .unwrap();
        // two ticks of 0.00001 against the trader
        assert_eq!(sell.position.unwrap().open_price, price(dec!(1.08498)));
    }

    #[test]
    fn insufficient_free_margin_leaves_nothing_behind() {
        let engine = engine();
        let account_id = open_account(&engine, Some(dec!(1500)));
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));
        assert_eq!(
            engine.account_snapshot(account_id).unwrap().account.free_margin,
            Money::new(dec!(500))
        );

        let err = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1))))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientMargin {
                required: Money::new(dec!(1000)),
                available: Money::new(dec!(500)),
            }
        );
        assert_eq!(engine.orders(account_id, None).unwrap().len(), 1);
        assert_eq!(engine.open_positions(account_id).unwrap().len(), 1);
    }

    #[test]
    fn rejects_bad_requests_before_touching_the_account() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let unknown = engine.submit_order(account_id, OrderRequest::market("FOOBAR", OrderSide::Buy, lots(dec!(1))));
        assert_eq!(unknown.unwrap_err().code(), ErrorCode::InvalidSymbol);

        let too_big = engine.submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(101))));
        assert_eq!(too_big.unwrap_err().code(), ErrorCode::VolumeOutOfRange);

        let mut no_price = OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1)));
        no_price.order_type = OrderType::Limit;
        let missing = engine.submit_order(account_id, no_price);
        assert_eq!(missing.unwrap_err().code(), ErrorCode::InvalidRequest);

        assert!(engine.orders(account_id, None).unwrap().is_empty());
    }

    #[test]
    fn stale_quote_is_unavailable() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        engine.set_time(Timestamp::from_millis(START_MS + 5_000));

        let err = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1))))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::QuoteUnavailable);
    }

    #[test]
    fn crossed_tick_is_refused() {
        let engine = engine();
        let err = engine.on_quote(eurusd(dec!(1.0855), dec!(1.0850), 0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::QuoteUnavailable);
    }

    #[test]
    fn limit_order_fills_at_its_price_when_touched() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let placed = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0840))),
            )
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert!(placed.position.is_none());

        let report = engine.on_quote(eurusd(dec!(1.0845), dec!(1.0847), 100)).unwrap();
        assert!(report.orders_filled.is_empty());

        let report = engine.on_quote(eurusd(dec!(1.0838), dec!(1.0840), 200)).unwrap();
        assert_eq!(report.orders_filled, vec![placed.order.id]);
        let positions = engine.open_positions(account_id).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].open_price, price(dec!(1.0840)));
    }

    #[test]
    fn ioc_order_not_triggered_is_cancelled() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let placed = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0800)))
                    .with_time_in_force(TimeInForce::Ioc),
            )
            .unwrap();
        let report = engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 100)).unwrap();
        assert_eq!(report.orders_cancelled, vec![placed.order.id]);

        let cancelled = engine.orders(account_id, Some(OrderStatus::Cancelled)).unwrap();
        assert_eq!(cancelled.len(), 1);
    }

    #[test]
    fn triggered_order_without_margin_is_rejected() {
        let engine = engine();
        let account_id = open_account(&engine, Some(dec!(1500)));
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let pending = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0840))),
            )
            .unwrap();
        buy_market(&engine, account_id, dec!(1));

        let report = engine.on_quote(eurusd(dec!(1.0838), dec!(1.0840), 100)).unwrap();
        assert_eq!(report.orders_rejected, vec![pending.order.id]);
        let order = engine.order(account_id, pending.order.id).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(order.reject_reason.unwrap().contains("Insufficient margin"));
    }

    #[test]
    fn cancel_order_twice_fails() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let placed = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0800))),
            )
            .unwrap();

        let cancelled = engine.cancel_order(account_id, placed.order.id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            engine.cancel_order(account_id, placed.order.id).unwrap_err(),
            EngineError::OrderNotPending(placed.order.id)
        );
        assert_eq!(
            engine.cancel_order(account_id, OrderId(999)).unwrap_err(),
            EngineError::OrderNotFound(OrderId(999))
        );
    }
}

/// Position edits, closes and protective levels.
mod position_tests {
    use super::*;

    #[test]
    fn close_realizes_profit_into_balance() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let position = buy_market(&engine, account_id, dec!(1)).position.unwrap();

        engine.on_quote(eurusd(dec!(1.0880), dec!(1.0882), 100)).unwrap();
        let trade = engine.close_position(account_id, position.id).unwrap();
        assert_eq!(trade.close_price, price(dec!(1.0882)));
        assert_eq!(trade.profit, Money::new(dec!(300)));
        assert_eq!(trade.pips, dec!(30));
        assert_eq!(trade.reason, CloseReason::Manual);

        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.balance, Money::new(dec!(25300)));
        assert_eq!(account.equity, Money::new(dec!(25300)));
        assert_eq!(account.used_margin, Money::zero());

        let again = engine.close_position(account_id, position.id).unwrap_err();
        assert_eq!(again, EngineError::PositionNotOpen(position.id));
        assert_eq!(engine.trade_history(account_id, &HistoryFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn modify_keeps_unset_levels() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let position = buy_market(&engine, account_id, dec!(1)).position.unwrap();

        let update = ProtectionUpdate {
            sl: Some(price(dec!(1.0800))),
            tp: Some(price(dec!(1.0900))),
        };
        engine.modify_position(account_id, position.id, update).unwrap();
        let modified = engine
            .modify_position(
                account_id,
                position.id,
                ProtectionUpdate {
                    sl: Some(price(dec!(1.0820))),
                    tp: None,
                },
            )
            .unwrap();
        assert_eq!(modified.sl, Some(price(dec!(1.0820))));
        assert_eq!(modified.tp, Some(price(dec!(1.0900))));

        engine.close_position(account_id, position.id).unwrap();
        let err = engine.modify_position(account_id, position.id, update).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PositionNotOpen);
    }

    #[test]
    fn stop_loss_closes_on_the_tick_that_crosses_it() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        engine
            .submit_order(
                account_id,
                OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1)))
                    .with_protection(Some(price(dec!(1.0832))), None),
            )
            .unwrap();

        let report = engine.on_quote(eurusd(dec!(1.0828), dec!(1.0830), 100)).unwrap();
        assert_eq!(report.protective_closes.len(), 1);
        let trade = &report.protective_closes[0];
        assert_eq!(trade.reason, CloseReason::StopLoss);
        assert_eq!(trade.profit, Money::new(dec!(-220)));
        assert!(engine.open_positions(account_id).unwrap().is_empty());
    }

    #[test]
    fn close_all_closes_every_position() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));
        buy_market(&engine, account_id, dec!(0.5));

        engine.on_quote(eurusd(dec!(1.0860), dec!(1.0862), 100)).unwrap();
        let report = engine.close_all_positions(account_id).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.realized, Money::new(dec!(150)));
        assert!(engine.open_positions(account_id).unwrap().is_empty());
    }

    #[test]
    fn close_all_reports_positions_without_a_quote() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));

        // EURUSD goes stale
        engine.set_time(Timestamp::from_millis(START_MS + 2_000));
        let report = engine.close_all_positions(account_id).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(engine.open_positions(account_id).unwrap().len(), 1);

        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 2_000)).unwrap();
        let retry = engine.close_all_positions(account_id).unwrap();
        assert!(retry.is_complete());
        assert_eq!(retry.trades.len(), 1);
    }
}

/// OCO and nested OCO groups.
mod oco_tests {
    use super::*;

    #[test]
    fn bracket_is_built_around_the_ask() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let result = engine.submit_oco_order(account_id, oco_request(dec!(1), dec!(20), dec!(40))).unwrap();
        assert_eq!(result.orders.len(), 2);
        assert_eq!(result.group.status, GroupStatus::Active);
        assert_eq!(result.group.kind, GroupKind::Oco);

        let stop = &result.orders[0];
        assert_eq!(stop.order_type, OrderType::Stop);
        assert_eq!(stop.stop_price, Some(price(dec!(1.0832))));
        let limit = &result.orders[1];
        assert_eq!(limit.order_type, OrderType::Limit);
        assert_eq!(limit.limit_price, Some(price(dec!(1.0892))));
        assert!(result.orders.iter().all(|o| o.group_id() == Some(result.group.id)));
    }

    #[test]
    fn cancelling_the_group_cancels_both_legs() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let result = engine.submit_oco_order(account_id, oco_request(dec!(1), dec!(20), dec!(40))).unwrap();

        assert_eq!(engine.cancel_group(account_id, result.group.id).unwrap(), 2);
        let group = engine.oco_group(account_id, result.group.id).unwrap();
        assert_eq!(group.status, GroupStatus::Cancelled);

        // nothing left to cancel
        assert_eq!(engine.cancel_group(account_id, result.group.id).unwrap(), 0);
        assert_eq!(
            engine.cancel_group(account_id, GroupId(77)).unwrap_err(),
            EngineError::GroupNotFound(GroupId(77))
        );
    }

    #[test]
    fn cancelling_one_leg_cancels_the_group() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let result = engine.submit_oco_order(account_id, oco_request(dec!(1), dec!(20), dec!(40))).unwrap();
        let (stop_id, limit_id) = (result.orders[0].id, result.orders[1].id);

        let cancelled = engine.cancel_order(account_id, stop_id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(engine.order(account_id, limit_id).unwrap().status, OrderStatus::Cancelled);
        let group = engine.oco_group(account_id, result.group.id).unwrap();
        assert_eq!(group.status, GroupStatus::Cancelled);

        let reasons: Vec<CancelReason> = engine
            .account_events(account_id)
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::OrderCancelled(c) => Some(c.reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![CancelReason::UserRequested, CancelReason::OcoSiblingCancelled]);

        // the take-profit level is reached but nothing is left to fill
        let report = engine.on_quote(eurusd(dec!(1.0892), dec!(1.0894), 100)).unwrap();
        assert!(report.orders_filled.is_empty());
    }

    #[test]
    fn cancelling_a_nested_leg_keeps_the_other_pair() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let result = engine
            .submit_ocooco_order(
                account_id,
                OcoOcoRequest::new("EURUSD", OrderSide::Buy, lots(dec!(1)), bracket(dec!(20), dec!(40)), bracket(dec!(30), dec!(60))),
            )
            .unwrap();

        engine.cancel_order(account_id, result.orders[1].id).unwrap();
        let pending: Vec<OrderId> = engine
            .orders(account_id, Some(OrderStatus::Pending))
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&result.orders[2].id) && pending.contains(&result.orders[3].id));
        assert_eq!(engine.oco_group(account_id, result.group.id).unwrap().status, GroupStatus::Active);
    }

    #[test]
    fn absolute_levels_beat_pip_offsets() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let levels = Bracket::from(bracket(dec!(20), dec!(40)))
            .with_prices(Some(price(dec!(1.0800))), Some(price(dec!(1.0950))))
            .with_leg_types(StopLegType::StopLimit, TakeProfitLegType::Limit);
        let request = OcoRequest::new("EURUSD", OrderSide::Buy, lots(dec!(1)), levels).with_time_in_force(TimeInForce::Day);
        let result = engine.submit_oco_order(account_id, request).unwrap();

        let stop = &result.orders[0];
        assert_eq!(stop.order_type, OrderType::StopLimit);
        assert_eq!(stop.stop_price, Some(price(dec!(1.0800))));
        assert_eq!(stop.limit_price, Some(price(dec!(1.0800))));
        assert_eq!(result.orders[1].limit_price, Some(price(dec!(1.0950))));
        assert!(result.orders.iter().all(|o| o.time_in_force == TimeInForce::Day));

        // the pip stop at 1.0832 would fire here; the absolute one does not
        let report = engine.on_quote(eurusd(dec!(1.0828), dec!(1.0830), 100)).unwrap();
        assert!(report.orders_filled.is_empty());
        let report = engine.on_quote(eurusd(dec!(1.0798), dec!(1.0800), 200)).unwrap();
        assert_eq!(report.orders_filled, vec![stop.id]);
        assert_eq!(engine.open_positions(account_id).unwrap()[0].open_price, price(dec!(1.0800)));
    }

    #[test]
    fn absolute_level_on_the_wrong_side_is_refused() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let levels = Bracket::from(bracket(dec!(20), dec!(40))).with_prices(None, Some(price(dec!(1.0840))));
        let err = engine
            .submit_oco_order(account_id, OcoRequest::new("EURUSD", OrderSide::Buy, lots(dec!(1)), levels))
            .unwrap_err();
        assert!(matches!(err, EngineError::GroupCreationFailed { leg: 0, .. }));
        assert!(engine.orders(account_id, None).unwrap().is_empty());
    }

    #[test]
    fn fill_cancels_the_sibling() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let result = engine.submit_oco_order(account_id, oco_request(dec!(1), dec!(20), dec!(40))).unwrap();
        let (stop_id, limit_id) = (result.orders[0].id, result.orders[1].id);

        let report = engine.on_quote(eurusd(dec!(1.0892), dec!(1.0894), 100)).unwrap();
        assert_eq!(report.orders_filled, vec![limit_id]);
        assert_eq!(report.orders_cancelled, vec![stop_id]);

        let group = engine.oco_group(account_id, result.group.id).unwrap();
        assert_eq!(group.status, GroupStatus::PartiallyFilled);
        assert_eq!(engine.order(account_id, stop_id).unwrap().status, OrderStatus::Cancelled);

        let positions = engine.open_positions(account_id).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].open_price, price(dec!(1.0892)));
    }

    #[test]
    fn nested_group_keeps_the_other_pair_live() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let result = engine
            .submit_ocooco_order(
                account_id,
                OcoOcoRequest {
                    comment: Some("ladder".to_string()),
                    ..OcoOcoRequest::new("EURUSD", OrderSide::Buy, lots(dec!(1)), bracket(dec!(20), dec!(40)), bracket(dec!(30), dec!(60)))
                },
            )
            .unwrap();
        assert_eq!(result.orders.len(), 4);
        assert_eq!(result.group.kind, GroupKind::OcoOco);

        // primary stop at 1.0832 triggers, secondary stop at 1.0822 does not
        let report = engine.on_quote(eurusd(dec!(1.0828), dec!(1.0830), 100)).unwrap();
        assert_eq!(report.orders_filled, vec![result.orders[0].id]);
        assert_eq!(report.orders_cancelled, vec![result.orders[1].id]);

        let pending = engine.orders(account_id, Some(OrderStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 2);
        let group = engine.oco_group(account_id, result.group.id).unwrap();
        assert_eq!(group.status, GroupStatus::PartiallyFilled);
    }

    #[test]
    fn failed_leg_rolls_back_the_whole_group() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        // the secondary stop would sit below zero
        let err = engine
            .submit_ocooco_order(
                account_id,
                OcoOcoRequest::new("EURUSD", OrderSide::Buy, lots(dec!(1)), bracket(dec!(20), dec!(40)), bracket(dec!(20000), dec!(60))),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::GroupCreationFailed { leg: 2, .. }));
        assert!(engine.orders(account_id, None).unwrap().is_empty());
        assert!(engine.oco_groups(account_id).unwrap().is_empty());
    }

    #[test]
    fn group_legs_need_free_margin() {
        let engine = engine();
        let account_id = open_account(&engine, Some(dec!(500)));
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let err = engine
            .submit_oco_order(account_id, oco_request(dec!(1), dec!(20), dec!(40)))
            .unwrap_err();
        assert!(matches!(err, EngineError::GroupCreationFailed { leg: 0, .. }));
        assert_eq!(err.code().status(), 422);
        assert!(engine.orders(account_id, None).unwrap().is_empty());
    }
}

/// Drawdown rules, targets and phases.
mod risk_tests {
    use super::*;

    #[test]
    fn ten_percent_drawdown_breaches_and_liquidates() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));
        let pending = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0500))),
            )
            .unwrap();

        // 260 pips on 1 lot: equity 22400, drawdown 10.4%
        let report = engine.on_quote(eurusd(dec!(1.0590), dec!(1.0592), 500)).unwrap();
        assert_eq!(report.breaches.len(), 1);
        let liquidation = &report.breaches[0];
        assert_eq!(liquidation.trades.len(), 1);
        assert_eq!(liquidation.trades[0].reason, CloseReason::Breach);
        assert_eq!(liquidation.realized, Money::new(dec!(-2600)));
        assert_eq!(liquidation.cancelled_orders, vec![pending.order.id]);

        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.phase, Phase::Breached);
        assert!(account.breached_at.is_some());
        assert_eq!(account.equity, Money::new(dec!(22400)));
        assert!(engine.open_positions(account_id).unwrap().is_empty());

        let violations = engine.violations(account_id).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::MaxDrawdown);
        assert_eq!(violations[0].severity, Severity::Critical);

        let err = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1))))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountInactive);
    }

    #[test]
    fn exactly_at_the_limit_is_not_a_breach() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));

        // 250 pips: exactly 10%
        let report = engine.on_quote(eurusd(dec!(1.0600), dec!(1.0602), 500)).unwrap();
        assert!(report.breaches.is_empty());
        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.phase, Phase::Challenge1);
        assert_eq!(account.max_drawdown_used, dec!(10));
    }

    #[test]
    fn daily_limit_warns_once() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        buy_market(&engine, account_id, dec!(1));

        // 150 pips: 6% daily drawdown, above 5% but below 10%
        engine.on_quote(eurusd(dec!(1.0700), dec!(1.0702), 100)).unwrap();
        engine.on_quote(eurusd(dec!(1.0690), dec!(1.0692), 200)).unwrap();

        let violations = engine.violations(account_id).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::DailyDrawdown);
        assert_eq!(violations[0].severity, Severity::Warning);
        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.phase, Phase::Challenge1);
        assert_eq!(account.daily_drawdown_used, dec!(6.4));
    }

    #[test]
    fn target_unlocks_the_next_phase() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();

        let err = engine.advance_phase(account_id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPhaseTransition);

        buy_market(&engine, account_id, dec!(1));
        // +200 pips on 1 lot = 2000 = 8% of 25000
        engine.on_quote(eurusd(dec!(1.1050), dec!(1.1052), 100)).unwrap();
        assert!(engine.account_snapshot(account_id).unwrap().account.target_reached);

        assert_eq!(engine.advance_phase(account_id).unwrap(), Phase::Challenge2);
        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.phase, Phase::Challenge2);
        assert!(!account.target_reached);
    }

    #[test]
    fn daily_reset_moves_the_anchor_and_expires_day_orders() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let day = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0800)))
                    .with_time_in_force(TimeInForce::Day),
            )
            .unwrap();
        let gtc = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0800))),
            )
            .unwrap();

        // before 17:00 New York nothing rolls
        assert_eq!(engine.run_daily_reset(Timestamp::from_millis(START_MS + 3_600_000)).unwrap(), 0);
        // 23:00 UTC is 18:00 New York
        assert_eq!(engine.run_daily_reset(Timestamp::from_millis(START_MS + 9 * 3_600_000)).unwrap(), 1);

        assert_eq!(engine.order(account_id, day.order.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(engine.order(account_id, gtc.order.id).unwrap().status, OrderStatus::Pending);
        let account = engine.account_snapshot(account_id).unwrap().account;
        assert_eq!(account.daily_drawdown_used, Decimal::ZERO);
    }
}

/// Trade history and statistics.
mod stats_tests {
    use super::*;

    #[test]
    fn profit_factor_edges() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        assert_eq!(
            engine.trade_stats(account_id).unwrap().profit_factor,
            ProfitFactor::Finite(Decimal::ZERO)
        );

        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let long = buy_market(&engine, account_id, dec!(1)).position.unwrap();
        engine.on_quote(eurusd(dec!(1.0870), dec!(1.0872), 100)).unwrap();
        engine.close_position(account_id, long.id).unwrap();
        assert!(engine.trade_stats(account_id).unwrap().profit_factor.is_infinite());

        let short = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Sell, lots(dec!(1))))
            .unwrap()
            .position
            .unwrap();
        engine.on_quote(eurusd(dec!(1.0880), dec!(1.0882), 200)).unwrap();
        engine.close_position(account_id, short.id).unwrap();

        let stats = engine.trade_stats(account_id).unwrap();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, dec!(50));
        assert_eq!(stats.average_win, Money::new(dec!(200)));
        assert_eq!(stats.average_loss, Money::new(dec!(-100)));
        assert_eq!(stats.profit_factor, ProfitFactor::Finite(dec!(2)));
    }

    #[test]
    fn history_is_newest_first_and_filterable() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        engine
            .on_quote(QuoteTick::new(
                "GBPUSD",
                price(dec!(1.2650)),
                price(dec!(1.2652)),
                Timestamp::from_millis(START_MS),
            ))
            .unwrap();

        let first = buy_market(&engine, account_id, dec!(1)).position.unwrap();
        engine.set_time(Timestamp::from_millis(START_MS + 100));
        engine.close_position(account_id, first.id).unwrap();

        let second = engine
            .submit_order(account_id, OrderRequest::market("GBPUSD", OrderSide::Buy, lots(dec!(1))))
            .unwrap()
            .position
            .unwrap();
        engine.set_time(Timestamp::from_millis(START_MS + 200));
        engine.close_position(account_id, second.id).unwrap();

        let all = engine.trade_history(account_id, &HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].symbol, "GBPUSD");

        let filter = HistoryFilter {
            symbol: Some("EURUSD".to_string()),
            ..HistoryFilter::default()
        };
        let eur = engine.trade_history(account_id, &filter).unwrap();
        assert_eq!(eur.len(), 1);
        assert_eq!(eur[0].position_id, first.id);
    }

    #[test]
    fn risk_calculator_uses_free_margin() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        let calc = engine
            .calculate_risk(account_id, "EURUSD", lots(dec!(2)), Some(dec!(25)))
            .unwrap();
        assert_eq!(calc.margin_required, Money::new(dec!(2000)));
        assert_eq!(calc.pip_value, Money::new(dec!(20)));
        assert_eq!(calc.max_volume, dec!(25));
        assert_eq!(calc.risk_amount, Some(Money::new(dec!(500))));
        assert_eq!(calc.risk_percent, Some(dec!(2)));
    }
}

/// Account lifecycle and shutdown.
mod lifecycle_tests {
    use super::*;

    #[test]
    fn archived_accounts_disappear() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        assert_eq!(engine.find_accounts_by_user("trader-1").len(), 1);

        engine.archive_account(account_id).unwrap();
        assert_eq!(
            engine.account_snapshot(account_id).unwrap_err(),
            EngineError::AccountNotFound(account_id)
        );
        assert!(engine.find_accounts_by_user("trader-1").is_empty());
    }

    #[test]
    fn starting_balance_must_be_positive() {
        let engine = engine();
        let err = engine
            .open_account(OpenAccountRequest {
                user_id: "u".to_string(),
                challenge_type: ChallengeType::Express,
                starting_balance: Some(Money::zero()),
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn shutdown_drains_pending_orders() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let placed = engine
            .submit_order(
                account_id,
                OrderRequest::limit("EURUSD", OrderSide::Buy, lots(dec!(1)), price(dec!(1.0800))),
            )
            .unwrap();

        let snapshots = engine.shutdown();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].pending_orders, 0);
        assert!(engine.is_shutting_down());

        let err = engine
            .submit_order(account_id, OrderRequest::market("EURUSD", OrderSide::Buy, lots(dec!(1))))
            .unwrap_err();
        assert_eq!(err, EngineError::ShuttingDown);
        // reads still work
        assert_eq!(engine.order(account_id, placed.order.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(engine.shutdown().len(), 1);
    }

    #[test]
    fn events_trace_the_order_flow() {
        let engine = engine();
        let account_id = open_account(&engine, None);
        engine.on_quote(eurusd(dec!(1.0850), dec!(1.0852), 0)).unwrap();
        let position = buy_market(&engine, account_id, dec!(1)).position.unwrap();
        engine.close_position(account_id, position.id).unwrap();

        let kinds: Vec<&str> = engine
            .account_events(account_id)
            .iter()
            .map(|e| match e.payload {
                EventPayload::AccountOpened { .. } => "opened",
                EventPayload::OrderPlaced(_) => "placed",
                EventPayload::OrderFilled(_) => "filled",
                EventPayload::PositionOpened(_) => "position",
                EventPayload::PositionClosed(_) => "closed",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["opened", "placed", "filled", "position", "closed"]);
        assert_eq!(engine.recent_events(2).len(), 2);
    }
}
