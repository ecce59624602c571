// 8.0.2: result types and errors for engine operations.

use crate::account::{Account, AccountError, Phase};
use crate::oco::OcoGroup;
use crate::order::{Order, OrderError};
use crate::position::{LedgerError, Position};
use crate::quote::QuoteError;
use crate::symbol::SymbolError;
use crate::trade::Trade;
use crate::types::{AccountId, GroupId, Money, OrderId, PositionId};
use crate::validator::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of a single order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order: Order,
    /// Set when the order filled immediately
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcoResult {
    pub group: OcoGroup,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionFailure {
    pub position_id: PositionId,
    pub error: EngineError,
}

/// Result of closing every open position of an account, manually or on breach.
/// positions that could not be closed stay open and are listed so the caller can retry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationReport {
    pub account_id: Option<AccountId>,
    pub trades: Vec<Trade>,
    pub failures: Vec<PositionFailure>,
    pub cancelled_orders: Vec<OrderId>,
    pub realized: Money,
}

impl LiquidationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What one quote tick did across all accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteReport {
    pub accounts_marked: usize,
    pub positions_marked: usize,
    pub orders_filled: Vec<OrderId>,
    pub orders_rejected: Vec<OrderId>,
    pub orders_cancelled: Vec<OrderId>,
    pub protective_closes: Vec<Trade>,
    pub breaches: Vec<LiquidationReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: Account,
    pub open_positions: usize,
    pub pending_orders: usize,
    pub closed_trades: usize,
}

/// Machine-readable failure kind exposed at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidSymbol,
    VolumeOutOfRange,
    InsufficientMargin,
    PositionNotOpen,
    OrderNotPending,
    QuoteUnavailable,
    AccountNotFound,
    GroupCreationFailed,
    AccountInactive,
    InvalidPhaseTransition,
    OrderNotFound,
    PositionNotFound,
    GroupNotFound,
    InvalidRequest,
    ShuttingDown,
}

impl ErrorCode {
    /// HTTP-style status for the surrounding API layer. all are client-recoverable.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::AccountNotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::PositionNotFound
            | ErrorCode::GroupNotFound => 404,
            ErrorCode::InsufficientMargin | ErrorCode::GroupCreationFailed => 422,
            ErrorCode::PositionNotOpen
            | ErrorCode::OrderNotPending
            | ErrorCode::AccountInactive
            | ErrorCode::InvalidPhaseTransition
            | ErrorCode::QuoteUnavailable
            | ErrorCode::ShuttingDown => 409,
            ErrorCode::InvalidSymbol | ErrorCode::VolumeOutOfRange | ErrorCode::InvalidRequest => 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Volume {volume} outside allowed range {min}..={max} lots")]
    VolumeOutOfRange { volume: Decimal, min: Decimal, max: Decimal },

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Money, available: Money },

    #[error("Position {0} is not open")]
    PositionNotOpen(PositionId),

    #[error("Order {0} is not pending")]
    OrderNotPending(OrderId),

    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("OCO group creation failed at leg {leg}: {reason}")]
    GroupCreationFailed { leg: usize, reason: String },

    #[error("Account {account_id} is {phase:?} and cannot trade")]
    AccountInactive { account_id: AccountId, phase: Phase },

    #[error("Cannot advance from {from:?}: {reason}")]
    InvalidPhaseTransition { from: Phase, reason: String },

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Group {0} not found")]
    GroupNotFound(GroupId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidSymbol(_) => ErrorCode::InvalidSymbol,
            EngineError::VolumeOutOfRange { .. } => ErrorCode::VolumeOutOfRange,
            EngineError::InsufficientMargin { .. } => ErrorCode::InsufficientMargin,
            EngineError::PositionNotOpen(_) => ErrorCode::PositionNotOpen,
            EngineError::OrderNotPending(_) => ErrorCode::OrderNotPending,
            EngineError::QuoteUnavailable { .. } => ErrorCode::QuoteUnavailable,
            EngineError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            EngineError::GroupCreationFailed { .. } => ErrorCode::GroupCreationFailed,
            EngineError::AccountInactive { .. } => ErrorCode::AccountInactive,
            EngineError::InvalidPhaseTransition { .. } => ErrorCode::InvalidPhaseTransition,
            EngineError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            EngineError::PositionNotFound(_) => ErrorCode::PositionNotFound,
            EngineError::GroupNotFound(_) => ErrorCode::GroupNotFound,
            EngineError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            EngineError::ShuttingDown => ErrorCode::ShuttingDown,
        }
    }
}

impl From<SymbolError> for EngineError {
    fn from(err: SymbolError) -> Self {
        match err {
            SymbolError::Unknown(ticker) => EngineError::InvalidSymbol(ticker),
            SymbolError::VolumeOutOfRange { volume, min, max } => EngineError::VolumeOutOfRange { volume, min, max },
        }
    }
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotPending { order_id, .. } => EngineError::OrderNotPending(order_id),
            OrderError::MissingPrice { .. } => EngineError::InvalidRequest(err.to_string()),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Symbol(e) => e.into(),
            ValidationError::Order(e) => e.into(),
            ValidationError::InsufficientMargin { required, available } => {
                EngineError::InsufficientMargin { required, available }
            }
        }
    }
}

impl From<QuoteError> for EngineError {
    fn from(err: QuoteError) -> Self {
        let symbol = match &err {
            QuoteError::Missing(symbol) => symbol.clone(),
            QuoteError::Stale { symbol, .. } | QuoteError::Crossed { symbol, .. } => symbol.clone(),
        };
        EngineError::QuoteUnavailable {
            symbol,
            reason: err.to_string(),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => EngineError::PositionNotFound(id),
            LedgerError::NotOpen(id) => EngineError::PositionNotOpen(id),
        }
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidPhaseTransition { from, reason } => EngineError::InvalidPhaseTransition {
                from,
                reason: reason.to_string(),
            },
        }
    }
}
