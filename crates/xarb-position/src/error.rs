//! Position error types.

use thiserror::Error;
use xarb_core::PositionId;

#[derive(Debug, Error)]
pub enum PositionError {
    /// A mutation would break a ledger invariant. The ledger is unchanged.
    #[error("Ledger invariant violation for {position_id}: {reason}")]
    LedgerInvariantViolation {
        position_id: PositionId,
        reason: String,
    },
}

pub type PositionResult<T> = Result<T, PositionError>;
