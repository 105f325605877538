//! Core domain types for the xarb spread arbitrage engine.
//!
//! This crate provides the types shared across the workspace:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `MarketQuote`, `QuotePair`, `Direction`, `Leg`: Market data and pair geometry
//! - `OrderRequest`, `OrderHandle`, `OrderStatusReport`: Order plumbing
//! - `ExchangeClient`: The venue seam
//! - `TradeEvent`, `ExecutionIncident`: Trade-log records

pub mod decimal;
pub mod error;
pub mod events;
pub mod exchange;
pub mod order;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use events::{
    CloseReason, ExecutionIncident, IncidentKind, LegRecord, PositionId, TradeAction, TradeEvent,
};
pub use exchange::{BoxFuture, DynExchangeClient, ExchangeClient, ExchangeError, ExchangeResult};
pub use order::{
    ClientOrderId, FillKind, OrderHandle, OrderRequest, OrderSide, OrderState, OrderStatusReport,
    OrderType,
};
pub use types::{Direction, InstrumentTag, Leg, MarketQuote, QuotePair, QuoteState};
