//! Trade-log event types.
//!
//! The run loop emits one [`TradeEvent`] per ledger mutation (OPEN, ADD,
//! CLOSE) and one [`ExecutionIncident`] per execution that did not end in a
//! clean pair fill. Both are serialized one-per-line by the persistence
//! writer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClientOrderId, Direction, InstrumentTag, OrderSide, Size};

/// Position identifier, `{direction}_{YYYYmmddHHMMSS}[_{n}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for a position opened at `at`. `seq > 0` disambiguates positions
    /// opened within the same second.
    pub fn generate(direction: Direction, at: DateTime<Utc>, seq: u32) -> Self {
        let stamp = at.format("%Y%m%d%H%M%S");
        if seq == 0 {
            Self(format!("{direction}_{stamp}"))
        } else {
            Self(format!("{direction}_{stamp}_{seq}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a position was closed. Also the close-cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    Reversal,
    TakeProfit,
    Timeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reversal => "reversal",
            Self::TakeProfit => "take_profit",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger action recorded in the trade log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Open,
    Add,
    Close,
}

/// One append-only trade-log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub position_id: PositionId,
    pub direction: Direction,
    /// Notional of this action (OPEN/ADD increment, or the closed size).
    pub size: Decimal,
    /// Entry spread after this action (weighted for ADD).
    pub entry_spread: Decimal,
    /// Executable spread the close was done at.
    pub close_spread: Option<Decimal>,
    /// Fees for this action, per unit of the underlying.
    pub fees_paid: Decimal,
    /// Set on CLOSE only.
    pub realized_pnl: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
    pub holding_secs: Option<u64>,
}

/// Kind of execution incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// One leg filled, the other did not; the filled leg was unwound.
    PartialFillRolledBack,
    /// One leg filled and the unwind also failed. Exposure is unhedged.
    PartialFillRollbackFailure,
    /// Neither leg filled within the retry budget.
    RetryExhausted,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialFillRolledBack => write!(f, "partial_fill_rolled_back"),
            Self::PartialFillRollbackFailure => write!(f, "partial_fill_rollback_failure"),
            Self::RetryExhausted => write!(f, "retry_exhausted"),
        }
    }
}

/// One attempted order leg, enough to rebuild state by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRecord {
    pub cloid: ClientOrderId,
    pub instrument: InstrumentTag,
    pub side: OrderSide,
    pub requested: Size,
    pub filled: Size,
    pub exchange_id: Option<String>,
    pub error: Option<String>,
}

/// Execution that did not end in a clean pair fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionIncident {
    pub timestamp: DateTime<Utc>,
    pub kind: IncidentKind,
    /// Decision kind, e.g. `open`, `add`, `close:reversal`.
    pub decision: String,
    pub position_id: Option<PositionId>,
    pub direction: Direction,
    pub legs: Vec<LegRecord>,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_position_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            PositionId::generate(Direction::AToB, at, 0).as_str(),
            "A_TO_B_20250314092653"
        );
        assert_eq!(
            PositionId::generate(Direction::BToA, at, 2).as_str(),
            "B_TO_A_20250314092653_2"
        );
    }

    #[test]
    fn test_incident_kind_serde() {
        let json = serde_json::to_string(&IncidentKind::PartialFillRollbackFailure).unwrap();
        assert_eq!(json, "\"PARTIAL_FILL_ROLLBACK_FAILURE\"");
    }
}
