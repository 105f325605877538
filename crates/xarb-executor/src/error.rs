//! Executor error types.

use thiserror::Error;
use xarb_core::{ExchangeError, InstrumentTag};
use xarb_position::PositionError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// An exchange call did not answer within `order_timeout_ms`.
    #[error("Execution timeout on {instrument} after {timeout_ms}ms")]
    ExecutionTimeout {
        instrument: InstrumentTag,
        timeout_ms: u64,
    },

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Settlement rejected by the ledger. Only the current decision is lost.
    #[error("Ledger rejected settlement: {0}")]
    Ledger(#[from] PositionError),

    #[error("Invalid execution config: {0}")]
    Config(String),
}

impl ExecutorError {
    /// Whether the same call may be retried within the leg budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExecutionTimeout { .. } => true,
            Self::Exchange(e) => e.is_retryable(),
            Self::Ledger(_) | Self::Config(_) => false,
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
