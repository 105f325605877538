//! Pair order execution for xarb.
//!
//! # Key Components
//!
//! - [`ExecutionCoordinator`]: Executes engine decisions on both legs and
//!   settles fills into the ledger
//! - [`HardStopLatch`]: Halts new exposure after a failed rollback until an
//!   operator resets it
//! - [`PaperExchange`]: In-process exchange for paper mode and tests
//!
//! # Leg handling
//!
//! 1. Placement retried up to `max_leg_retries` with exponential backoff
//! 2. Every exchange call bounded by `order_timeout_ms`
//! 3. Uneven fills unwound with an opposite market order
//! 4. Failed unwind -> incident + hard stop

pub mod config;
pub mod coordinator;
pub mod error;
mod legs;
pub mod paper;
pub mod risk;

pub use config::ExecutionConfig;
pub use coordinator::{
    ExecutionCoordinator, ExecutionOutcome, ExecutionReport, PairFill, Settlement,
};
pub use error::{ExecutorError, ExecutorResult};
pub use paper::PaperExchange;
pub use risk::{HardStopLatch, HardStopStatus};
