//! Decision types returned by the engine each tick.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use xarb_core::{CloseReason, Direction, PositionId};
use xarb_detector::StableOpportunity;

/// One action for the execution coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Fresh pair position.
    Open {
        direction: Direction,
        size: Decimal,
        opportunity: StableOpportunity,
    },
    /// Grow an existing position on same-direction widening.
    Add {
        position_id: PositionId,
        direction: Direction,
        add_size: Decimal,
        opportunity: StableOpportunity,
    },
    /// Close a position. `Reversal` closes with taker orders; the other
    /// reasons use maker-then-taker.
    Close {
        position_id: PositionId,
        direction: Direction,
        reason: CloseReason,
        /// Executable spread in the closing direction at decision time.
        close_spread: Decimal,
        /// Estimated net PnL at decision time.
        expected_pnl: Decimal,
    },
}

impl Decision {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Add { .. } => "add",
            Self::Close { reason, .. } => match reason {
                CloseReason::Reversal => "close_reversal",
                CloseReason::TakeProfit => "close_take_profit",
                CloseReason::Timeout => "close_timeout",
            },
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Open { direction, .. }
            | Self::Add { direction, .. }
            | Self::Close { direction, .. } => *direction,
        }
    }

    /// Target position, `None` for OPEN.
    pub fn position_id(&self) -> Option<&PositionId> {
        match self {
            Self::Open { .. } => None,
            Self::Add { position_id, .. } | Self::Close { position_id, .. } => Some(position_id),
        }
    }

    /// Whether this decision increases exposure.
    pub fn adds_exposure(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Add { .. })
    }
}

/// Outcome of the close cascade for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCheck {
    Close {
        reason: CloseReason,
        close_spread: Decimal,
        expected_pnl: Decimal,
    },
    Hold {
        unrealized_pnl: Decimal,
    },
}
