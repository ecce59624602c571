// 8.0 engine/core.rs: main engine. holds the symbol registry, the quote book and every account.
// one mutex per account: every read-modify-write on an account holds its lock for the whole
// operation. accounts never lock each other, so there is no lock ordering to get wrong.

use super::config::EngineConfig;
use super::results::{AccountSnapshot, EngineError};
use crate::account::{Account, ChallengeRules, OpenAccountRequest, Phase};
use crate::events::{CancelReason, EventLog, EventPayload, OrderCancelledEvent};
use crate::order::{Order, OrderBook, TimeInForce};
use crate::position::PositionLedger;
use crate::quote::QuoteBook;
use crate::risk::Violation;
use crate::symbol::SymbolRegistry;
use crate::trade::TradeRecorder;
use crate::types::{AccountId, GroupId, OrderId, PositionId, Timestamp, TradeId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Everything owned by one account. only touched under the account's lock.
#[derive(Debug)]
pub struct AccountBook {
    pub account: Account,
    pub orders: OrderBook,
    pub ledger: PositionLedger,
    pub trades: TradeRecorder,
    pub violations: Vec<Violation>,
}

impl AccountBook {
    fn new(account: Account) -> Self {
        Self {
            account,
            orders: OrderBook::new(),
            ledger: PositionLedger::new(),
            trades: TradeRecorder::new(),
            violations: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            account: self.account.clone(),
            open_positions: self.ledger.open_count(),
            pending_orders: self.orders.pending_ids().len(),
            closed_trades: self.trades.len(),
        }
    }

    /// Recompute account aggregates from the ledger.
    pub(super) fn recompute(&mut self, now: Timestamp) {
        let used = self.ledger.used_margin();
        let floating = self.ledger.floating_profit();
        self.account.recompute(used, floating, now);
    }
}

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) registry: SymbolRegistry,
    pub(super) quotes: QuoteBook,
    pub(super) accounts: DashMap<AccountId, Arc<Mutex<AccountBook>>>,
    pub(super) events: EventLog,
    pub(super) next_account_id: AtomicU64,
    pub(super) next_order_id: AtomicU64,
    pub(super) next_position_id: AtomicU64,
    pub(super) next_trade_id: AtomicU64,
    pub(super) next_group_id: AtomicU64,
    pub(super) current_time: AtomicI64,
    pub(super) shutting_down: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: SymbolRegistry) -> Self {
        let quotes = QuoteBook::new(config.max_quote_age_ms);
        let events = EventLog::new(config.max_events);
        info!(symbols = registry.len(), "engine started");
        Self {
            config,
            registry,
            quotes,
            accounts: DashMap::new(),
            events,
            next_account_id: AtomicU64::new(1),
            next_order_id: AtomicU64::new(1),
            next_position_id: AtomicU64::new(1),
            next_trade_id: AtomicU64::new(1),
            next_group_id: AtomicU64::new(1),
            current_time: AtomicI64::new(Timestamp::now().as_millis()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        self.current_time.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn time(&self) -> Timestamp {
        Timestamp::from_millis(self.current_time.load(Ordering::SeqCst))
    }

    /// Move the clock forward to `timestamp`; never backwards.
    pub(super) fn advance_time_to(&self, timestamp: Timestamp) -> Timestamp {
        let previous = self.current_time.fetch_max(timestamp.as_millis(), Ordering::SeqCst);
        Timestamp::from_millis(previous.max(timestamp.as_millis()))
    }

    pub(super) fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn next_position_id(&self) -> PositionId {
        PositionId(self.next_position_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn next_trade_id(&self) -> TradeId {
        TradeId(self.next_trade_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn next_group_id(&self) -> GroupId {
        GroupId(self.next_group_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    pub(super) fn emit(&self, account_id: AccountId, payload: EventPayload) {
        self.events.record(account_id, self.time(), payload);
    }

    pub(super) fn handle(&self, account_id: AccountId) -> Result<Arc<Mutex<AccountBook>>, EngineError> {
        self.accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    /// Handles of every account, collected first so no map shard stays locked
    /// while an account mutex is taken.
    pub(super) fn handles(&self) -> Vec<Arc<Mutex<AccountBook>>> {
        let mut handles: Vec<(AccountId, Arc<Mutex<AccountBook>>)> = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Run `f` on a live (non-archived) account under its lock.
    pub(super) fn with_account<T>(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut AccountBook) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let handle = self.handle(account_id)?;
        let mut book = handle.lock();
        if book.account.is_archived() {
            return Err(EngineError::AccountNotFound(account_id));
        }
        f(&mut *book)
    }

    /// Like `with_account`, but only for accounts that may still trade.
    pub(super) fn with_trading_account<T>(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut AccountBook) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            if !book.account.can_trade() {
                return Err(EngineError::AccountInactive {
                    account_id,
                    phase: book.account.phase,
                });
            }
            f(book)
        })
    }

    // 8.2: account lifecycle

    pub fn open_account(&self, request: OpenAccountRequest) -> Result<AccountSnapshot, EngineError> {
        self.ensure_running()?;
        if let Some(balance) = request.starting_balance {
            if !balance.is_positive() {
                return Err(EngineError::InvalidRequest(format!(
                    "starting balance must be positive, got {balance}"
                )));
            }
        }

        let id = AccountId(self.next_account_id.fetch_add(1, Ordering::Relaxed));
        let rules = ChallengeRules::for_type(request.challenge_type);
        let account = Account::open(id, &request, &rules, self.time());
        let starting_balance = account.starting_balance;
        let book = AccountBook::new(account);
        let snapshot = book.snapshot();
        self.accounts.insert(id, Arc::new(Mutex::new(book)));

        info!(account_id = %id, user_id = %request.user_id, %starting_balance, "account opened");
        self.emit(
            id,
            EventPayload::AccountOpened {
                user_id: request.user_id,
                starting_balance,
            },
        );
        Ok(snapshot)
    }

    /// Live accounts owned by `user_id`, oldest first.
    pub fn find_accounts_by_user(&self, user_id: &str) -> Vec<AccountSnapshot> {
        self.handles()
            .into_iter()
            .filter_map(|handle| {
                let book = handle.lock();
                (book.account.user_id == user_id && !book.account.is_archived()).then(|| book.snapshot())
            })
            .collect()
    }

    /// Soft delete. pending orders are cancelled; the account stays in memory.
    pub fn archive_account(&self, account_id: AccountId) -> Result<AccountSnapshot, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let now = self.time();
            self.cancel_pending(book, CancelReason::UserRequested, now);
            book.account.archive(now);
            info!(%account_id, "account archived");
            self.emit(account_id, EventPayload::AccountArchived);
            Ok(book.snapshot())
        })
    }

    /// Administrative phase advance.
    pub fn advance_phase(&self, account_id: AccountId) -> Result<Phase, EngineError> {
        self.ensure_running()?;
        self.with_account(account_id, |book| {
            let from = book.account.phase;
            let to = book.account.advance_phase(self.time())?;
            info!(%account_id, ?from, ?to, "phase advanced");
            self.emit(account_id, EventPayload::PhaseAdvanced { from, to });
            Ok(to)
        })
    }

    /// Roll every account's daily period at `now`. returns how many accounts rolled.
    pub fn run_daily_reset(&self, now: Timestamp) -> Result<usize, EngineError> {
        self.ensure_running()?;
        let now = self.advance_time_to(now);
        let mut rolled = 0;
        for handle in self.handles() {
            let mut book = handle.lock();
            if book.account.is_archived() {
                continue;
            }
            if self.settle(&mut *book, now).rolled {
                rolled += 1;
            }
        }
        Ok(rolled)
    }

    /// Cancel every pending order of an account. returns the cancelled ids.
    pub(super) fn cancel_pending(&self, book: &mut AccountBook, reason: CancelReason, now: Timestamp) -> Vec<OrderId> {
        self.cancel_where(book, reason, now, |_| true)
    }

    /// Cancel pending `Day` orders placed before the current daily anchor.
    pub(super) fn expire_day_orders(&self, book: &mut AccountBook, now: Timestamp) -> Vec<OrderId> {
        let anchor = book.account.day_anchor_at;
        self.cancel_where(book, CancelReason::Expired, now, |order| {
            order.time_in_force == TimeInForce::Day && order.created_at < anchor
        })
    }

    pub(super) fn cancel_where(
        &self,
        book: &mut AccountBook,
        reason: CancelReason,
        now: Timestamp,
        pred: impl Fn(&Order) -> bool,
    ) -> Vec<OrderId> {
        let account_id = book.account.id;
        let mut cancelled = Vec::new();
        for id in book.orders.pending_ids() {
            let Some(order) = book.orders.get_mut(id) else {
                continue;
            };
            if !pred(order) {
                continue;
            }
            if order.cancel(now).is_ok() {
                cancelled.push(id);
                self.emit(
                    account_id,
                    EventPayload::OrderCancelled(OrderCancelledEvent { order_id: id, reason }),
                );
            }
        }
        cancelled
    }

    /// Drain: cancel all pending orders and return the final snapshots.
    /// every mutating call after this fails with `ShuttingDown`.
    pub fn shutdown(&self) -> Vec<AccountSnapshot> {
        let first = !self.shutting_down.swap(true, Ordering::SeqCst);
        let now = self.time();
        let snapshots: Vec<AccountSnapshot> = self
            .handles()
            .into_iter()
            .map(|handle| {
                let mut book = handle.lock();
                if first {
                    self.cancel_pending(&mut *book, CancelReason::Shutdown, now);
                }
                book.snapshot()
            })
            .collect();
        if first {
            info!(accounts = snapshots.len(), "engine shut down");
        }
        snapshots
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
