//! Challenge accounts.
//!
//! An account carries realized balance plus the aggregates the risk engine
//! recomputes after every ledger change. Accounts are archived, never removed.

use crate::types::{AccountId, Money, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Challenge product the account was bought as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    Standard,
    Express,
    Scaling,
}

/// Rule set applied when an account is provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRules {
    pub challenge_type: ChallengeType,
    pub name: String,
    /// Profit target as percent of the starting balance
    pub profit_target_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub daily_drawdown_percent: Decimal,
    pub min_trading_days: u32,
    pub duration_days: u32,
    pub account_size: Money,
}

impl ChallengeRules {
    pub fn standard() -> Self {
        Self {
            challenge_type: ChallengeType::Standard,
            name: "Standard Challenge".to_string(),
            profit_target_percent: dec!(8),
            max_drawdown_percent: dec!(10),
            daily_drawdown_percent: dec!(5),
            min_trading_days: 5,
            duration_days: 30,
            account_size: Money::new(dec!(25000)),
        }
    }

    pub fn express() -> Self {
        Self {
            challenge_type: ChallengeType::Express,
            name: "Express Challenge".to_string(),
            min_trading_days: 3,
            duration_days: 14,
            ..Self::standard()
        }
    }

    pub fn scaling() -> Self {
        Self {
            challenge_type: ChallengeType::Scaling,
            name: "Scaling Challenge".to_string(),
            profit_target_percent: dec!(10),
            min_trading_days: 10,
            duration_days: 60,
            account_size: Money::new(dec!(100000)),
            ..Self::standard()
        }
    }

    pub fn for_type(challenge_type: ChallengeType) -> Self {
        match challenge_type {
            ChallengeType::Standard => Self::standard(),
            ChallengeType::Express => Self::express(),
            ChallengeType::Scaling => Self::scaling(),
        }
    }

    pub fn profit_target(&self, starting_balance: Money) -> Money {
        starting_balance.mul(self.profit_target_percent / dec!(100))
    }
}

/// Account phase.
///
/// `challenge_1 -> challenge_2 -> funded -> completed`, with `breached`
/// reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "challenge_1")]
    Challenge1,
    #[serde(rename = "challenge_2")]
    Challenge2,
    #[serde(rename = "funded")]
    Funded,
    #[serde(rename = "breached")]
    Breached,
    #[serde(rename = "completed")]
    Completed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Breached | Phase::Completed)
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, Phase::Challenge1 | Phase::Challenge2)
    }

    /// Administrative successor, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Challenge1 => Some(Phase::Challenge2),
            Phase::Challenge2 => Some(Phase::Funded),
            Phase::Funded => Some(Phase::Completed),
            Phase::Breached | Phase::Completed => None,
        }
    }
}

/// Provisioning request. the caller identity comes from the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub user_id: String,
    pub challenge_type: ChallengeType,
    /// Overrides the rule set's account size
    pub starting_balance: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: String,
    pub account_number: String,
    pub challenge_type: ChallengeType,
    pub phase: Phase,
    pub starting_balance: Money,
    /// Realized
    pub balance: Money,
    pub equity: Money,
    pub used_margin: Money,
    pub free_margin: Money,
    /// Lifetime P&L against the starting balance
    pub profit: Money,
    pub profit_percent: Decimal,
    pub profit_target: Money,
    pub max_drawdown_limit: Decimal,
    pub daily_drawdown_limit: Decimal,
    pub max_drawdown_used: Decimal,
    pub daily_drawdown_used: Decimal,
    /// Highest equity seen in the current rule period
    pub peak_equity: Money,
    /// Equity at the most recent daily reset boundary
    pub day_anchor_equity: Money,
    pub day_anchor_at: Timestamp,
    pub daily_warning_raised: bool,
    pub target_reached: bool,
    pub challenge_started_at: Timestamp,
    pub breached_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    pub fn open(id: AccountId, request: &OpenAccountRequest, rules: &ChallengeRules, timestamp: Timestamp) -> Self {
        let starting = request.starting_balance.unwrap_or(rules.account_size);
        Self {
            id,
            user_id: request.user_id.clone(),
            account_number: account_number(id),
            challenge_type: rules.challenge_type,
            phase: Phase::Challenge1,
            starting_balance: starting,
            balance: starting,
            equity: starting,
            used_margin: Money::zero(),
            free_margin: starting,
            profit: Money::zero(),
            profit_percent: Decimal::ZERO,
            profit_target: rules.profit_target(starting),
            max_drawdown_limit: rules.max_drawdown_percent,
            daily_drawdown_limit: rules.daily_drawdown_percent,
            max_drawdown_used: Decimal::ZERO,
            daily_drawdown_used: Decimal::ZERO,
            peak_equity: starting,
            day_anchor_equity: starting,
            day_anchor_at: timestamp,
            daily_warning_raised: false,
            target_reached: false,
            challenge_started_at: timestamp,
            breached_at: None,
            deleted_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Trading is allowed only in a non-terminal phase.
    pub fn can_trade(&self) -> bool {
        !self.phase.is_terminal() && !self.is_archived()
    }

    // 6.1: equity = balance + floating, free = equity - used, profit against start
    pub fn recompute(&mut self, used_margin: Money, floating_profit: Money, timestamp: Timestamp) {
        self.used_margin = used_margin;
        self.equity = self.balance.add(floating_profit);
        self.free_margin = self.equity.sub(self.used_margin);
        self.profit = self.equity.sub(self.starting_balance);
        self.profit_percent = self.profit.percent_of(self.starting_balance);
        self.updated_at = timestamp;
    }

    /// Move a closed position's profit into the realized balance.
    pub fn realize(&mut self, profit: Money) {
        self.balance = self.balance.add(profit);
    }

    pub fn breach(&mut self, timestamp: Timestamp) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Breached;
        self.breached_at = Some(timestamp);
        self.updated_at = timestamp;
    }

    /// Administrative phase advance. challenge phases require the profit target.
    pub fn advance_phase(&mut self, timestamp: Timestamp) -> Result<Phase, AccountError> {
        let next = self.phase.next().ok_or(AccountError::InvalidPhaseTransition {
            from: self.phase,
            reason: "phase is terminal",
        })?;
        if self.phase.is_challenge() && !self.target_reached {
            return Err(AccountError::InvalidPhaseTransition {
                from: self.phase,
                reason: "profit target not reached",
            });
        }
        self.phase = next;
        if next.is_challenge() || next == Phase::Funded {
            self.challenge_started_at = timestamp;
            self.reset_period(timestamp);
        }
        self.updated_at = timestamp;
        Ok(next)
    }

    /// Start a fresh rule period from the current equity.
    pub fn reset_period(&mut self, timestamp: Timestamp) {
        self.peak_equity = self.equity;
        self.day_anchor_equity = self.equity;
        self.day_anchor_at = timestamp;
        self.max_drawdown_used = Decimal::ZERO;
        self.daily_drawdown_used = Decimal::ZERO;
        self.daily_warning_raised = false;
        self.target_reached = false;
    }

    pub fn archive(&mut self, timestamp: Timestamp) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(timestamp);
            self.updated_at = timestamp;
        }
    }
}

fn account_number(id: AccountId) -> String {
    format!("PC-{:08}", id.0)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("Cannot advance from {from:?}: {reason}")]
    InvalidPhaseTransition { from: Phase, reason: &'static str },
}
