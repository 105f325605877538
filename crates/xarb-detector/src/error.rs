//! Detector error types.

use thiserror::Error;
use xarb_core::{InstrumentTag, QuoteState};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// Crossed, one-sided or stale market data. The cycle must not decide.
    #[error("Invalid quote for {instrument}: {reason}")]
    InvalidQuote {
        instrument: InstrumentTag,
        reason: InvalidQuoteReason,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Why a quote was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidQuoteReason {
    Book(QuoteState),
    Stale { age_ms: u64, max_age_ms: u64 },
}

impl std::fmt::Display for InvalidQuoteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Book(state) => write!(f, "book state {state}"),
            Self::Stale { age_ms, max_age_ms } => {
                write!(f, "stale ({age_ms}ms > {max_age_ms}ms)")
            }
        }
    }
}

impl InvalidQuoteReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Book(QuoteState::Crossed) => "crossed",
            Self::Book(_) => "missing_side",
            Self::Stale { .. } => "stale",
        }
    }
}

pub type DetectorResult<T> = Result<T, DetectorError>;
