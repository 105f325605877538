//! Trade log persistence for xarb.
//!
//! Appends trade events and execution incidents to daily JSON Lines files
//! for post-trade analysis and manual reconciliation.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{PersistenceConfig, TradeLogRecord, TradeLogWriter};
