//! Opportunity detection for the xarb pair.
//!
//! - [`ProfitCalculator`]: executable spread, net profit and close economics
//! - [`SpreadSampler`]: confirms an opportunity over N consecutive ticks
//!
//! A tick with crossed, one-sided or stale quotes yields
//! [`DetectorError::InvalidQuote`] and must not feed a decision.

pub mod config;
pub mod error;
pub mod fee;
pub mod sampler;

pub use config::DetectorConfig;
pub use error::{DetectorError, DetectorResult, InvalidQuoteReason};
pub use fee::{CloseMethod, CloseProfit, FeeSchedule, ProfitCalculator, ProfitEstimate};
pub use sampler::{SpreadObservation, SpreadSampler, StableOpportunity};
