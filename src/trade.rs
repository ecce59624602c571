// 9.0: closed-trade history. a trade is written exactly once, when its position
// closes, and never touched again. every statistic is read off this append-only log.

use crate::position::{calculate_pips, calculate_profit, CloseReason, Position};
use crate::types::{AccountId, Money, PositionId, Price, Side, Timestamp, TradeId, Volume};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub volume: Volume,
    pub open_price: Price,
    pub close_price: Price,
    pub commission: Money,
    pub swap: Money,
    pub profit: Money,
    pub pips: Decimal,
    pub duration_seconds: i64,
    pub reason: CloseReason,
    pub opened_at: Timestamp,
    pub closed_at: Timestamp,
}

// 9.1: pure. same position and close price always give the same record
pub fn record_trade(id: TradeId, position: &Position, close_price: Price, reason: CloseReason, closed_at: Timestamp) -> Trade {
    Trade {
        id,
        account_id: position.account_id,
        position_id: position.id,
        symbol: position.symbol.clone(),
        side: position.side,
        volume: position.volume,
        open_price: position.open_price,
        close_price,
        commission: position.commission,
        swap: position.swap,
        profit: calculate_profit(position.side, position.volume, position.lot_size, position.open_price, close_price),
        pips: calculate_pips(position.side, position.pip_size, position.open_price, close_price),
        duration_seconds: position.opened_at.seconds_until(closed_at),
        reason,
        opened_at: position.opened_at,
        closed_at,
    }
}

/// avg win / |avg loss|. infinite with wins and no losses, zero with no wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFactor {
    Finite(Decimal),
    Infinite,
}

impl ProfitFactor {
    pub fn is_infinite(&self) -> bool {
        matches!(self, ProfitFactor::Infinite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with positive profit
    pub win_rate: Decimal,
    pub total_profit: Money,
    pub average_win: Money,
    /// Negative (or zero)
    pub average_loss: Money,
    pub largest_win: Money,
    pub largest_loss: Money,
    pub profit_factor: ProfitFactor,
    pub average_duration_seconds: i64,
}

impl TradeStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let wins: Vec<Money> = trades.iter().map(|t| t.profit).filter(Money::is_positive).collect();
        let losses: Vec<Money> = trades.iter().map(|t| t.profit).filter(Money::is_negative).collect();

        let average_win = average(&wins);
        let average_loss = average(&losses);
        let profit_factor = match (wins.is_empty(), losses.is_empty()) {
            (true, _) => ProfitFactor::Finite(Decimal::ZERO),
            (false, true) => ProfitFactor::Infinite,
            (false, false) => ProfitFactor::Finite(average_win.value() / average_loss.value().abs()),
        };

        let total = trades.len();
        let (win_rate, average_duration_seconds) = if total == 0 {
            (Decimal::ZERO, 0)
        } else {
            let durations: i64 = trades.iter().map(|t| t.duration_seconds).sum();
            (
                Decimal::from(wins.len()) / Decimal::from(total) * dec!(100),
                durations / total as i64,
            )
        };

        Self {
            total_trades: total,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_profit: trades.iter().map(|t| t.profit).sum(),
            average_win,
            average_loss,
            largest_win: wins.iter().copied().max().unwrap_or_default(),
            largest_loss: losses.iter().copied().min().unwrap_or_default(),
            profit_factor,
            average_duration_seconds,
        }
    }
}

fn average(values: &[Money]) -> Money {
    if values.is_empty() {
        return Money::zero();
    }
    let total: Money = values.iter().sum();
    Money::new(total.value() / Decimal::from(values.len()))
}

/// History query. newest close first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub symbol: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Append-only trade log of one account.
#[derive(Debug, Clone, Default)]
pub struct TradeRecorder {
    trades: Vec<Trade>,
}

impl TradeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, trade: Trade) -> &Trade {
        self.trades.push(trade);
        &self.trades[self.trades.len() - 1]
    }

    pub fn history(&self, filter: &HistoryFilter) -> Vec<Trade> {
        let mut matching: Vec<&Trade> = self
            .trades
            .iter()
            .filter(|t| filter.symbol.as_deref().map_or(true, |s| t.symbol == s))
            .collect();
        // stable, so equal close times keep reverse insertion order after the reverse
        matching.reverse();
        matching.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));

        matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TradeStats {
        TradeStats::from_trades(&self.trades)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}
