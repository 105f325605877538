//! Position ledger for hedged pair positions.
//!
//! # Key Components
//!
//! - [`Position`]: One hedged pair position (long buy leg, short sell leg)
//! - [`PositionLedger`]: Single-writer store with invariant checks on every mutation
//! - [`LedgerLimits`]: Position count, aggregate notional and single-position caps
//! - [`TradeStats`]: Cumulative statistics over the closed-position archive
//! - [`TimeStop`]: Holding-time limit used by the timeout close

pub mod error;
pub mod ledger;
pub mod time_stop;

pub use error::{PositionError, PositionResult};
pub use ledger::{
    CloseRecord, LedgerLimits, PortfolioState, Position, PositionLedger, PositionMark, PositionStatus,
    SizeUpdate, TradeStats,
};
pub use time_stop::TimeStop;
