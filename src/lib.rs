// prop-core: prop-challenge trading core.
// risk-first: every ledger change is followed by an equity recompute and a rule check.
// all computation is deterministic given quotes and the clock, no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Price, Money, Volume, Timestamp
//   2.x  symbol.rs: instrument registry, lot/pip conversion
//   2.5  quote.rs: latest-tick cache with staleness checks
//   3.x  order.rs: order state machine, triggers, per-account order book
//   3.5  oco.rs: OCO / nested OCO brackets and group resolution
//   4.x  position.rs: position struct, profit, mark-to-market, ledger
//   5.x  validator.rs: symbol, volume and margin checks before acceptance
//   6.x  account.rs: challenge accounts, rules presets, phases
//   6.3  risk.rs: drawdown, daily boundary, breach, risk calculator
//   8.x  engine/: core engine: orders, positions, pricing, queries
//   9.x  trade.rs: closed-trade history and statistics
//   11.x events.rs: state transition events for audit
//   12.x api.rs: command/query boundary and response envelope
//   13.x telemetry.rs: tracing subscriber setup

// core trading modules
pub mod account;
pub mod engine;
pub mod events;
pub mod order;
pub mod position;
pub mod quote;
pub mod symbol;
pub mod trade;
pub mod types;

// risk and safety modules
pub mod oco;
pub mod risk;
pub mod validator;

// integration modules
pub mod api;
pub mod telemetry;

// re exports for convenience
pub use account::*;
pub use engine::*;
pub use events::*;
pub use oco::*;
pub use order::*;
pub use position::*;
pub use quote::*;
pub use risk::*;
pub use symbol::*;
pub use trade::*;
pub use types::*;
pub use validator::*;
pub use api::{ApiResponse, EngineCommand, EngineQuery, EngineReply};
pub use telemetry::{init_logging, LogFormat, TelemetryError};
