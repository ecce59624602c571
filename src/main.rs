//! Prop-challenge core simulation.
//!
//! Walks a few accounts through the challenge lifecycle against a scripted
//! quote stream: market fills, OCO brackets, a drawdown breach and a daily reset.
//! Pass a TOML config path as the first argument to override the defaults.

use prop_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing::info;

type SimResult = Result<(), Box<dyn Error>>;

// 2025-03-03 14:00:00 UTC, a Monday
const START_MS: i64 = 1_741_010_400_000;

fn main() -> SimResult {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    init_logging(&config.log_level, config.log_format)?;

    println!("Prop Challenge Core Simulation\n");

    scenario_1_market_round_trip(&config)?;
    scenario_2_oco_bracket(&config)?;
    scenario_3_drawdown_breach(&config)?;
    scenario_4_daily_reset(&config)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn new_engine(config: &EngineConfig) -> Engine {
    let engine = Engine::new(config.clone(), SymbolRegistry::with_defaults());
    engine.set_time(Timestamp::from_millis(START_MS));
    engine
}

fn tick(symbol: &str, bid: Decimal, ask: Decimal, offset_ms: i64) -> QuoteTick {
    QuoteTick::new(
        symbol,
        Price::new_unchecked(bid),
        Price::new_unchecked(ask),
        Timestamp::from_millis(START_MS + offset_ms),
    )
}

fn open(engine: &Engine, user: &str) -> Result<AccountId, EngineError> {
    let snapshot = engine.open_account(OpenAccountRequest {
        user_id: user.to_string(),
        challenge_type: ChallengeType::Standard,
        starting_balance: None,
    })?;
    Ok(snapshot.account.id)
}

fn print_account(engine: &Engine, account_id: AccountId) -> Result<(), EngineError> {
    let snapshot = engine.account_snapshot(account_id)?;
    let account = &snapshot.account;
    println!(
        "  {} [{:?}] balance {} equity {} free margin {} dd {}% daily {}%",
        account.account_number,
        account.phase,
        account.balance,
        account.equity,
        account.free_margin,
        account.max_drawdown_used,
        account.daily_drawdown_used,
    );
    Ok(())
}

/// Open a long at market, let the price move, close it.
fn scenario_1_market_round_trip(config: &EngineConfig) -> SimResult {
    println!("Scenario 1: Market Round Trip\n");
    let engine = new_engine(config);
    let trader = open(&engine, "alice")?;

    engine.on_quote(tick("EURUSD", dec!(1.0850), dec!(1.0852), 0))?;
    let result = engine.submit_order(trader, OrderRequest::market("EURUSD", OrderSide::Buy, Volume::new_unchecked(dec!(1))))?;
    if let Some(position) = &result.position {
        println!("  BUY 1 lot EURUSD filled @ {} (margin {})", position.open_price, position.margin);
    }

    engine.on_quote(tick("EURUSD", dec!(1.0880), dec!(1.0882), 1_000))?;
    print_account(&engine, trader)?;

    for position in engine.open_positions(trader)? {
        let trade = engine.close_position(trader, position.id)?;
        println!("  closed @ {}: profit {} ({} pips)", trade.close_price, trade.profit, trade.pips);
    }
    print_account(&engine, trader)?;
    println!();
    Ok(())
}

/// 20/40 pip bracket around the ask; the take-profit leg fills and cancels the stop.
fn scenario_2_oco_bracket(config: &EngineConfig) -> SimResult {
    println!("Scenario 2: OCO Bracket\n");
    let engine = new_engine(config);
    let trader = open(&engine, "bob")?;

    engine.on_quote(tick("EURUSD", dec!(1.0850), dec!(1.0852), 0))?;
    let bracket = PipBracket {
        sl_pips: dec!(20),
        tp_pips: dec!(40),
    };
    let oco = engine.submit_oco_order(
        trader,
        OcoRequest::new("EURUSD", OrderSide::Buy, Volume::new_unchecked(dec!(0.5)), bracket)
            .with_time_in_force(TimeInForce::Day),
    )?;
    for order in &oco.orders {
        println!(
            "  leg {} {:?} @ {}",
            order.id,
            order.order_type,
            order.limit_price.or(order.stop_price).map(|p| p.to_string()).unwrap_or_default()
        );
    }

    // ask reaches the take-profit level
    let report = engine.on_quote(tick("EURUSD", dec!(1.0892), dec!(1.0894), 500))?;
    println!(
        "  filled {:?}, cancelled {:?}",
        report.orders_filled, report.orders_cancelled
    );
    let group = engine.oco_group(trader, oco.group.id)?;
    println!("  group {} is {:?}\n", group.id, group.status);
    Ok(())
}

/// A 2 lot long into a falling market crosses the 10% drawdown limit.
fn scenario_3_drawdown_breach(config: &EngineConfig) -> SimResult {
    println!("Scenario 3: Drawdown Breach\n");
    let engine = new_engine(config);
    let trader = open(&engine, "carol")?;

    engine.on_quote(tick("XAUUSD", dec!(2000.00), dec!(2000.10), 0))?;
    engine.submit_order(trader, OrderRequest::market("XAUUSD", OrderSide::Buy, Volume::new_unchecked(dec!(2))))?;

    let mut offset = 0;
    for bid in [dec!(1995), dec!(1990), dec!(1985), dec!(1980)] {
        offset += 1_000;
        let report = engine.on_quote(tick("XAUUSD", bid, bid + dec!(0.10), offset))?;
        print_account(&engine, trader)?;
        for liquidation in &report.breaches {
            println!(
                "  breached: {} positions liquidated, realized {}",
                liquidation.trades.len(),
                liquidation.realized
            );
        }
    }

    for violation in engine.violations(trader)? {
        println!("  violation: {}", violation.description);
    }
    println!();
    Ok(())
}

/// The day rolls over at 17:00 New York time and the daily anchor moves.
fn scenario_4_daily_reset(config: &EngineConfig) -> SimResult {
    println!("Scenario 4: Daily Reset\n");
    let engine = new_engine(config);
    let trader = open(&engine, "dave")?;

    engine.on_quote(tick("EURUSD", dec!(1.0850), dec!(1.0852), 0))?;
    engine.submit_order(trader, OrderRequest::market("EURUSD", OrderSide::Buy, Volume::new_unchecked(dec!(1))))?;
    engine.on_quote(tick("EURUSD", dec!(1.0870), dec!(1.0872), 1_000))?;
    print_account(&engine, trader)?;

    // 14:00 UTC + 9h = 23:00 UTC = 18:00 EST, past the boundary
    let after_close = Timestamp::from_millis(START_MS + 9 * 3_600_000);
    let rolled = engine.run_daily_reset(after_close)?;
    info!(rolled, "daily reset ran");
    println!("  {rolled} account(s) rolled into a new trading day");
    print_account(&engine, trader)?;

    let stats = engine.trade_stats(trader)?;
    println!("  {} closed trades, profit factor {:?}", stats.total_trades, stats.profit_factor);

    let drained = engine.shutdown();
    println!("  shutdown drained {} account(s)", drained.len());
    Ok(())
}
