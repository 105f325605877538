//! Status snapshots.
//!
//! Nothing here is stored between requests: a snapshot is derived from the
//! ledger, the latch and the last market view whenever it is asked for.

use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use xarb_core::{PositionId, QuotePair};
use xarb_detector::{ProfitCalculator, SpreadObservation, StableOpportunity};
use xarb_executor::{HardStopLatch, HardStopStatus};
use xarb_position::{PortfolioState, Position, PositionLedger, TradeStats};

use crate::config::OperatingMode;

/// What the run loop saw on its latest cycle.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    pub quotes: Option<QuotePair>,
    pub observation: Option<SpreadObservation>,
    pub opportunity: Option<StableOpportunity>,
    pub cycles: u64,
}

/// Point-in-time view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: OperatingMode,
    pub timestamp_ms: u64,
    pub cycles: u64,
    pub quotes: Option<QuotePair>,
    pub last_observation: Option<SpreadObservation>,
    pub opportunity: Option<StableOpportunity>,
    pub positions: Vec<Position>,
    pub portfolio: PortfolioState,
    pub statistics: TradeStats,
    pub hard_stop: HardStopStatus,
}

/// What an operator reset changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardStopReset {
    /// False when the latch was not set.
    pub reset: bool,
    /// Positions parked by a failed close, back under the engine.
    pub reopened: Vec<PositionId>,
}

/// Handle over the shared state for the status server. Cheap to clone.
#[derive(Clone)]
pub struct StatusReporter {
    mode: OperatingMode,
    ledger: Arc<RwLock<PositionLedger>>,
    hard_stop: Arc<HardStopLatch>,
    market: Arc<RwLock<MarketView>>,
    calculator: ProfitCalculator,
}

impl StatusReporter {
    pub fn new(
        mode: OperatingMode,
        ledger: Arc<RwLock<PositionLedger>>,
        hard_stop: Arc<HardStopLatch>,
        market: Arc<RwLock<MarketView>>,
        calculator: ProfitCalculator,
    ) -> Self {
        Self {
            mode,
            ledger,
            hard_stop,
            market,
            calculator,
        }
    }

    pub fn hard_stop(&self) -> &Arc<HardStopLatch> {
        &self.hard_stop
    }

    /// Operator reset of the hard stop. The operator squares the venue
    /// first; positions parked CLOSING then return to OPEN so the close
    /// cascade picks them up again.
    pub fn reset_hard_stop(&self) -> HardStopReset {
        let mut ledger = self.ledger.write();
        if !self.hard_stop.reset() {
            return HardStopReset {
                reset: false,
                reopened: Vec::new(),
            };
        }
        HardStopReset {
            reset: true,
            reopened: ledger.reopen_parked(),
        }
    }

    /// Positions are marked at the last quotes; a position that cannot be
    /// marked (no quotes yet, stale quotes) reports `None`.
    pub fn snapshot(&self, now_ms: u64) -> StatusSnapshot {
        let market = self.market.read().clone();

        let (positions, portfolio, statistics) = {
            let ledger = self.ledger.read();
            let portfolio = ledger.portfolio_state(|p| {
                market
                    .quotes
                    .as_ref()
                    .and_then(|q| self.calculator.unrealized_pnl(p, q, now_ms).ok())
            });
            (
                ledger.active_positions().to_vec(),
                portfolio,
                ledger.statistics(),
            )
        };

        StatusSnapshot {
            mode: self.mode,
            timestamp_ms: now_ms,
            cycles: market.cycles,
            quotes: market.quotes,
            last_observation: market.observation,
            opportunity: market.opportunity,
            positions,
            portfolio,
            statistics,
            hard_stop: self.hard_stop.status(),
        }
    }

    /// Total unrealized PnL at the last quotes.
    pub fn unrealized_pnl(&self, now_ms: u64) -> Decimal {
        self.snapshot(now_ms).portfolio.total_unrealized_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use xarb_core::{Direction, InstrumentTag, MarketQuote, Price, Size};
    use xarb_detector::FeeSchedule;
    use xarb_position::LedgerLimits;

    const NOW_MS: u64 = 1_741_944_413_000;

    fn quotes() -> QuotePair {
        QuotePair::new(
            MarketQuote::new(
                InstrumentTag::new("flx:TSLA"),
                Price::new(dec!(400.60)),
                Price::new(dec!(400.70)),
                NOW_MS,
            ),
            MarketQuote::new(
                InstrumentTag::new("xyz:TSLA"),
                Price::new(dec!(400.50)),
                Price::new(dec!(400.60)),
                NOW_MS,
            ),
        )
    }

    fn reporter() -> (StatusReporter, Arc<RwLock<MarketView>>) {
        let mut ledger = PositionLedger::new(LedgerLimits::default());
        ledger
            .add(Position::open(
                PositionId::new("A_TO_B_20250314092653"),
                Direction::AToB,
                dec!(100),
                Size::new(dec!(0.249)),
                dec!(0.50),
                dec!(0.024),
                NOW_MS,
            ))
            .unwrap();
        let market = Arc::new(RwLock::new(MarketView::default()));
        let reporter = StatusReporter::new(
            OperatingMode::Paper,
            Arc::new(RwLock::new(ledger)),
            Arc::new(HardStopLatch::new()),
            Arc::clone(&market),
            ProfitCalculator::new(FeeSchedule::default(), 5_000),
        );
        (reporter, market)
    }

    #[test]
    fn test_snapshot_without_quotes_leaves_positions_unmarked() {
        let (reporter, _) = reporter();
        let snapshot = reporter.snapshot(NOW_MS);

        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.portfolio.total_notional, dec!(100));
        assert_eq!(snapshot.portfolio.positions[0].unrealized_pnl, None);
        assert_eq!(snapshot.portfolio.total_unrealized_pnl, Decimal::ZERO);
        assert!(!snapshot.hard_stop.triggered);
    }

    #[test]
    fn test_snapshot_marks_positions_at_last_quotes() {
        let (reporter, market) = reporter();
        market.write().quotes = Some(quotes());

        let snapshot = reporter.snapshot(NOW_MS);
        let pnl = snapshot.portfolio.positions[0].unrealized_pnl.unwrap();
        // entry 0.50 + close spread 0.00 less two round-trip fees
        assert!(pnl > dec!(0.45) && pnl < dec!(0.50), "pnl = {pnl}");
        assert_eq!(reporter.unrealized_pnl(NOW_MS), pnl);
    }

    #[test]
    fn test_reset_reopens_parked_positions() {
        let (reporter, _) = reporter();
        let id = PositionId::new("A_TO_B_20250314092653");
        reporter.ledger.write().mark_closing(&id).unwrap();

        // Latch not set: nothing moves.
        let untouched = reporter.reset_hard_stop();
        assert!(!untouched.reset);
        assert!(untouched.reopened.is_empty());
        assert!(!reporter.snapshot(NOW_MS).positions[0].is_open());

        reporter.hard_stop().trigger("close unwind rejected");
        let reset = reporter.reset_hard_stop();
        assert!(reset.reset);
        assert_eq!(reset.reopened, vec![id]);
        assert!(reporter.snapshot(NOW_MS).positions[0].is_open());
        assert!(!reporter.hard_stop().is_triggered());
    }

    #[test]
    fn test_snapshot_reflects_hard_stop() {
        let (reporter, _) = reporter();
        reporter.hard_stop().trigger("unwind rejected");

        let snapshot = reporter.snapshot(NOW_MS);
        assert!(snapshot.hard_stop.triggered);
        assert_eq!(snapshot.hard_stop.reason.as_deref(), Some("unwind rejected"));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"mode\":\"paper\""));
    }
}
