//! Per-tick trading decisions for the xarb pair.
//!
//! [`DecisionEngine`] turns the ledger, the tick's quotes and the sampler's
//! stable opportunity into [`Decision`]s: closes by the reversal,
//! take-profit, timeout cascade, then at most one OPEN or ADD.

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;

pub use config::StrategyConfig;
pub use decision::{CloseCheck, Decision};
pub use engine::{DecisionEngine, Tick};
pub use error::{EngineError, EngineResult};
