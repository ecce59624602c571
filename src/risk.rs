//! Challenge risk rules.
//!
//! Drawdown is measured against the starting balance: the overall figure from
//! the peak equity of the current rule period, the daily figure from the equity
//! anchored at the last daily reset boundary. Crossing the overall limit breaches
//! the account; crossing only the daily limit is a warning.

use crate::account::Account;
use crate::engine::DailyResetConfig;
use crate::symbol::Symbol;
use crate::types::{AccountId, Money, Timestamp, Volume};
use chrono::{Duration, FixedOffset, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MaxDrawdown,
    DailyDrawdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// A recorded rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub account_id: AccountId,
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Drawdown percent at the time of the violation
    pub value: Decimal,
    pub limit: Decimal,
    pub description: String,
    pub created_at: Timestamp,
}

impl Violation {
    fn new(account_id: AccountId, kind: ViolationKind, value: Decimal, limit: Decimal, at: Timestamp) -> Self {
        let (severity, label) = match kind {
            ViolationKind::MaxDrawdown => (Severity::Critical, "maximum"),
            ViolationKind::DailyDrawdown => (Severity::Warning, "daily"),
        };
        Self {
            account_id,
            kind,
            severity,
            value,
            limit,
            description: format!(
                "Account exceeded {label} drawdown limit of {limit}%. Current drawdown at {}%.",
                value.round_dp(2)
            ),
            created_at: at,
        }
    }
}

/// What one evaluation found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskOutcome {
    pub drawdown: Decimal,
    pub daily_drawdown: Decimal,
    /// Set when this evaluation breached the account
    pub breach: Option<Violation>,
    /// Set the first time the daily limit is crossed in a day
    pub daily_warning: Option<Violation>,
    /// Set the first time the profit target is met in a period
    pub target_reached: bool,
}

/// `max(0, reference - equity) / starting * 100`
pub fn drawdown_percent(reference: Money, equity: Money, starting: Money) -> Decimal {
    let drop = reference.sub(equity).max(Money::zero());
    drop.percent_of(starting)
}

/// Most recent daily reset boundary at or before `now`.
pub fn last_reset_boundary(schedule: &DailyResetConfig, now: Timestamp) -> Option<Timestamp> {
    let offset = FixedOffset::east_opt(schedule.utc_offset_minutes * 60)?;
    let local = now.to_datetime().with_timezone(&offset);
    let cutoff = local.date_naive().and_hms_opt(schedule.hour, 0, 0)?;
    let mut boundary = offset.from_local_datetime(&cutoff).single()?;
    if boundary > local {
        boundary -= Duration::days(1);
    }
    Some(Timestamp::from(boundary.with_timezone(&Utc)))
}

/// Re-anchor the daily period if a boundary passed since the last anchor.
/// returns true when the day rolled.
pub fn roll_daily_period(account: &mut Account, schedule: &DailyResetConfig, now: Timestamp) -> bool {
    let Some(boundary) = last_reset_boundary(schedule, now) else {
        return false;
    };
    if boundary <= account.day_anchor_at {
        return false;
    }
    account.day_anchor_equity = account.equity;
    account.day_anchor_at = boundary;
    account.daily_drawdown_used = Decimal::ZERO;
    account.daily_warning_raised = false;
    true
}

/// Evaluate drawdown and target rules against freshly recomputed account figures.
/// a breach moves the account to `breached`; closing its positions is up to the caller.
pub fn evaluate(account: &mut Account, now: Timestamp) -> RiskOutcome {
    if account.phase.is_terminal() {
        return RiskOutcome::default();
    }

    account.peak_equity = account.peak_equity.max(account.equity);
    let drawdown = drawdown_percent(account.peak_equity, account.equity, account.starting_balance);
    let daily = drawdown_percent(account.day_anchor_equity, account.equity, account.starting_balance);

    // monotonic within the period
    account.max_drawdown_used = account.max_drawdown_used.max(drawdown);
    account.daily_drawdown_used = account.daily_drawdown_used.max(daily);

    let mut outcome = RiskOutcome {
        drawdown,
        daily_drawdown: daily,
        ..RiskOutcome::default()
    };

    let worst = drawdown.max(daily);
    if worst > account.max_drawdown_limit {
        account.breach(now);
        outcome.breach = Some(Violation::new(
            account.id,
            ViolationKind::MaxDrawdown,
            worst,
            account.max_drawdown_limit,
            now,
        ));
        return outcome;
    }

    if daily > account.daily_drawdown_limit && !account.daily_warning_raised {
        account.daily_warning_raised = true;
        outcome.daily_warning = Some(Violation::new(
            account.id,
            ViolationKind::DailyDrawdown,
            daily,
            account.daily_drawdown_limit,
            now,
        ));
    }

    if account.phase.is_challenge() && !account.target_reached && account.profit >= account.profit_target {
        account.target_reached = true;
        outcome.target_reached = true;
    }

    outcome
}

/// Position sizing figures for a prospective trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCalculation {
    pub margin_required: Money,
    pub pip_value: Money,
    /// Largest volume the free margin covers, capped at the symbol max
    pub max_volume: Decimal,
    pub risk_amount: Option<Money>,
    pub risk_percent: Option<Decimal>,
}

pub fn calculate_risk(
    symbol: &Symbol,
    volume: Volume,
    sl_pips: Option<Decimal>,
    free_margin: Money,
    equity: Money,
    margin_per_lot: Decimal,
) -> RiskCalculation {
    let pip_value = symbol.pip_value(volume);
    let affordable = if margin_per_lot.is_zero() || !free_margin.is_positive() {
        Decimal::ZERO
    } else {
        (free_margin.value() / margin_per_lot).round_dp_with_strategy(2, RoundingStrategy::ToZero)
    };
    let risk_amount = sl_pips.map(|pips| pip_value.mul(pips.abs()));

    RiskCalculation {
        margin_required: Money::new(volume.lots() * margin_per_lot),
        pip_value,
        max_volume: affordable.min(symbol.max_lot),
        risk_amount,
        risk_percent: risk_amount.map(|amount| amount.percent_of(equity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{ChallengeRules, ChallengeType, OpenAccountRequest, Phase};
    use crate::symbol::SymbolRegistry;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        let req = OpenAccountRequest {
            user_id: "usr_001".to_string(),
            challenge_type: ChallengeType::Standard,
            starting_balance: None,
        };
        Account::open(AccountId(1), &req, &ChallengeRules::standard(), Timestamp::from_millis(0))
    }

    fn set_equity(acct: &mut Account, equity: Decimal) {
        let floating = Money::new(equity).sub(acct.balance);
        acct.recompute(Money::zero(), floating, Timestamp::from_millis(1));
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        let dt: NaiveDateTime = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap();
        Timestamp::from(dt.and_utc())
    }

    #[test]
    fn breach_is_strict() {
        let mut acct = account();
        set_equity(&mut acct, dec!(22500));
        let outcome = evaluate(&mut acct, Timestamp::from_millis(2));
        assert_eq!(outcome.drawdown, dec!(10));
        assert!(outcome.breach.is_none());
        assert_eq!(acct.phase, Phase::Challenge1);

        set_equity(&mut acct, dec!(22400));
        let outcome = evaluate(&mut acct, Timestamp::from_millis(3));
        let violation = outcome.breach.unwrap();
        assert_eq!(violation.kind, ViolationKind::MaxDrawdown);
        assert_eq!(violation.severity, Severity::Critical);
        assert_eq!(violation.value, dec!(10.4));
        assert_eq!(acct.phase, Phase::Breached);
        assert!(acct.breached_at.is_some());
    }

    #[test]
    fn drawdown_measured_from_peak() {
        let mut acct = account();
        set_equity(&mut acct, dec!(26000));
        evaluate(&mut acct, Timestamp::from_millis(1));
        set_equity(&mut acct, dec!(25000));
        let outcome = evaluate(&mut acct, Timestamp::from_millis(2));
        // 1000 off the 26000 peak, against a 25000 start
        assert_eq!(outcome.drawdown, dec!(4));

        set_equity(&mut acct, dec!(25500));
        evaluate(&mut acct, Timestamp::from_millis(3));
        assert_eq!(acct.max_drawdown_used, dec!(4));
    }

    #[test]
    fn daily_warning_raised_once() {
        let mut acct = account();
        set_equity(&mut acct, dec!(23700));
        let first = evaluate(&mut acct, Timestamp::from_millis(1));
        let warning = first.daily_warning.unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(warning.value, dec!(5.2));
        assert!(first.breach.is_none());

        set_equity(&mut acct, dec!(23600));
        assert!(evaluate(&mut acct, Timestamp::from_millis(2)).daily_warning.is_none());
    }

    #[test]
    fn target_flagged_not_forced() {
        let mut acct = account();
        set_equity(&mut acct, dec!(27000));
        let outcome = evaluate(&mut acct, Timestamp::from_millis(1));
        assert!(outcome.target_reached);
        assert!(acct.target_reached);
        assert_eq!(acct.phase, Phase::Challenge1);
        assert!(!evaluate(&mut acct, Timestamp::from_millis(2)).target_reached);
    }

    #[test]
    fn terminal_accounts_not_evaluated() {
        let mut acct = account();
        acct.breach(Timestamp::from_millis(1));
        set_equity(&mut acct, dec!(1000));
        assert_eq!(evaluate(&mut acct, Timestamp::from_millis(2)), RiskOutcome::default());
    }

    #[test]
    fn boundary_is_five_pm_new_york() {
        let schedule = DailyResetConfig::default();
        // 21:30 UTC = 16:30 EST, still the previous day's session
        let before = last_reset_boundary(&schedule, utc(2024, 1, 15, 21, 30)).unwrap();
        assert_eq!(before, utc(2024, 1, 14, 22, 0));
        // 22:00 UTC = 17:00 EST exactly
        let at = last_reset_boundary(&schedule, utc(2024, 1, 15, 22, 0)).unwrap();
        assert_eq!(at, utc(2024, 1, 15, 22, 0));
    }

    #[test]
    fn day_roll_reanchors() {
        let schedule = DailyResetConfig::default();
        let mut acct = account();
        acct.day_anchor_at = utc(2024, 1, 14, 22, 0);
        set_equity(&mut acct, dec!(24000));
        evaluate(&mut acct, utc(2024, 1, 15, 12, 0));
        assert_eq!(acct.daily_drawdown_used, dec!(4));

        assert!(!roll_daily_period(&mut acct, &schedule, utc(2024, 1, 15, 21, 0)));
        assert!(roll_daily_period(&mut acct, &schedule, utc(2024, 1, 15, 22, 5)));
        assert_eq!(acct.day_anchor_equity.value(), dec!(24000));
        assert_eq!(acct.daily_drawdown_used, Decimal::ZERO);
        // overall drawdown keeps counting
        assert_eq!(acct.max_drawdown_used, dec!(4));
    }

    #[test]
    fn risk_calculator() {
        let registry = SymbolRegistry::with_defaults();
        let eurusd = registry.get("EURUSD").unwrap();
        let calc = calculate_risk(
            eurusd,
            Volume::new_unchecked(dec!(2)),
            Some(dec!(25)),
            Money::new(dec!(5555)),
            Money::new(dec!(25000)),
            dec!(1000),
        );
        assert_eq!(calc.margin_required.value(), dec!(2000));
        assert_eq!(calc.pip_value.value(), dec!(20));
        assert_eq!(calc.max_volume, dec!(5.55));
        assert_eq!(calc.risk_amount.unwrap().value(), dec!(500));
        assert_eq!(calc.risk_percent.unwrap(), dec!(2));
    }
}
