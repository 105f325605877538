//! xarb two-market spread arbitrage bot.
//!
//! Orchestrates all components:
//! - Top-of-book quotes for both legs
//! - Fee-adjusted spread sampling
//! - Decision engine and position ledger
//! - Pair execution (paper) or decision logging (observation)
//! - Trade log, metrics and the status endpoint

pub mod app;
pub mod config;
pub mod error;
pub mod server;
pub mod status;

pub use app::{now_ms, Application, CycleReport, SkipReason};
pub use config::{AppConfig, OperatingMode};
pub use error::{AppError, AppResult};
pub use status::{HardStopReset, MarketView, StatusReporter, StatusSnapshot};
