// 12.0: boundary types. whatever sits above the core (an HTTP layer, a socket bridge)
// speaks in commands and gets an ApiResponse back. errors never cross as panics,
// they become a machine-readable code plus a message.

use crate::account::{OpenAccountRequest, Phase};
use crate::engine::{
    AccountSnapshot, Engine, EngineError, ErrorCode, LiquidationReport, OcoResult, OrderResult,
};
use crate::events::Event;
use crate::oco::{OcoGroup, OcoOcoRequest, OcoRequest};
use crate::order::{Order, OrderRequest, OrderStatus};
use crate::position::{Position, ProtectionUpdate};
use crate::risk::{RiskCalculation, Violation};
use crate::trade::{HistoryFilter, Trade, TradeStats};
use crate::types::{AccountId, GroupId, OrderId, PositionId, Volume};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 12.1: response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiResponse<T> {
    Success { data: T },
    Failure { code: ErrorCode, message: String },
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ApiResponse::Success { .. } => None,
            ApiResponse::Failure { code, .. } => Some(*code),
        }
    }

    /// HTTP-style status: 200 on success, the error kind's status otherwise.
    pub fn status(&self) -> u16 {
        self.code().map_or(200, |code| code.status())
    }
}

impl<T> From<Result<T, EngineError>> for ApiResponse<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => ApiResponse::Success { data },
            Err(err) => ApiResponse::Failure {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

/// 12.2: state-changing calls. the caller identity is already resolved to an account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    OpenAccount { request: OpenAccountRequest },
    ArchiveAccount { account_id: AccountId },
    AdvancePhase { account_id: AccountId },
    SubmitOrder { account_id: AccountId, request: OrderRequest },
    SubmitOco { account_id: AccountId, request: OcoRequest },
    SubmitOcoOco { account_id: AccountId, request: OcoOcoRequest },
    CancelOrder { account_id: AccountId, order_id: OrderId },
    CancelGroup { account_id: AccountId, group_id: GroupId },
    ModifyPosition {
        account_id: AccountId,
        position_id: PositionId,
        #[serde(default)]
        update: ProtectionUpdate,
    },
    ClosePosition { account_id: AccountId, position_id: PositionId },
    CloseAllPositions { account_id: AccountId },
}

/// 12.3: read-only calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum EngineQuery {
    AccountSnapshot { account_id: AccountId },
    OpenPositions { account_id: AccountId },
    Orders {
        account_id: AccountId,
        #[serde(default)]
        status: Option<OrderStatus>,
    },
    OcoGroups { account_id: AccountId },
    TradeHistory {
        account_id: AccountId,
        #[serde(default)]
        filter: HistoryFilter,
    },
    TradeStats { account_id: AccountId },
    Violations { account_id: AccountId },
    CalculateRisk {
        account_id: AccountId,
        symbol: String,
        volume: Volume,
        #[serde(default)]
        sl_pips: Option<Decimal>,
    },
    RecentEvents { count: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EngineReply {
    Account(AccountSnapshot),
    Phase(Phase),
    Order(OrderResult),
    Oco(OcoResult),
    CancelledOrder(Order),
    CancelledCount(usize),
    Position(Position),
    Trade(Trade),
    Liquidation(LiquidationReport),
    Positions(Vec<Position>),
    Orders(Vec<Order>),
    Groups(Vec<OcoGroup>),
    Trades(Vec<Trade>),
    Stats(TradeStats),
    Violations(Vec<Violation>),
    Risk(RiskCalculation),
    Events(Vec<Event>),
}

impl Engine {
    /// 12.4: dispatch a command and wrap the outcome
    pub fn execute(&self, command: EngineCommand) -> ApiResponse<EngineReply> {
        let result = match command {
            EngineCommand::OpenAccount { request } => self.open_account(request).map(EngineReply::Account),
            EngineCommand::ArchiveAccount { account_id } => {
                self.archive_account(account_id).map(EngineReply::Account)
            }
            EngineCommand::AdvancePhase { account_id } => self.advance_phase(account_id).map(EngineReply::Phase),
            EngineCommand::SubmitOrder { account_id, request } => {
                self.submit_order(account_id, request).map(EngineReply::Order)
            }
            EngineCommand::SubmitOco { account_id, request } => {
                self.submit_oco_order(account_id, request).map(EngineReply::Oco)
            }
            EngineCommand::SubmitOcoOco { account_id, request } => {
                self.submit_ocooco_order(account_id, request).map(EngineReply::Oco)
            }
            EngineCommand::CancelOrder { account_id, order_id } => {
                self.cancel_order(account_id, order_id).map(EngineReply::CancelledOrder)
            }
            EngineCommand::CancelGroup { account_id, group_id } => {
                self.cancel_group(account_id, group_id).map(EngineReply::CancelledCount)
            }
            EngineCommand::ModifyPosition {
                account_id,
                position_id,
                update,
            } => self.modify_position(account_id, position_id, update).map(EngineReply::Position),
            EngineCommand::ClosePosition { account_id, position_id } => {
                self.close_position(account_id, position_id).map(EngineReply::Trade)
            }
            EngineCommand::CloseAllPositions { account_id } => {
                self.close_all_positions(account_id).map(EngineReply::Liquidation)
            }
        };
        result.into()
    }

    pub fn query(&self, query: EngineQuery) -> ApiResponse<EngineReply> {
        let result = match query {
            EngineQuery::AccountSnapshot { account_id } => self.account_snapshot(account_id).map(EngineReply::Account),
            EngineQuery::OpenPositions { account_id } => self.open_positions(account_id).map(EngineReply::Positions),
            EngineQuery::Orders { account_id, status } => self.orders(account_id, status).map(EngineReply::Orders),
            EngineQuery::OcoGroups { account_id } => self.oco_groups(account_id).map(EngineReply::Groups),
            EngineQuery::TradeHistory { account_id, filter } => {
                self.trade_history(account_id, &filter).map(EngineReply::Trades)
            }
            EngineQuery::TradeStats { account_id } => self.trade_stats(account_id).map(EngineReply::Stats),
            EngineQuery::Violations { account_id } => self.violations(account_id).map(EngineReply::Violations),
            EngineQuery::CalculateRisk {
                account_id,
                symbol,
                volume,
                sl_pips,
            } => self
                .calculate_risk(account_id, &symbol, volume, sl_pips)
                .map(EngineReply::Risk),
            EngineQuery::RecentEvents { count } => Ok(EngineReply::Events(self.recent_events(count))),
        };
        result.into()
    }
}
