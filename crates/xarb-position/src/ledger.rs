//! Position ledger: the single-writer store of hedged pair positions.
//!
//! Active positions are kept in insertion order. A closed position leaves the
//! active set and is appended to the archive, which only feeds statistics.
//! Every mutation re-checks the ledger invariants and leaves state untouched
//! when one would be broken.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use chrono::{DateTime, Utc};
use xarb_core::{CloseReason, Direction, PositionId, Size};

use crate::error::{PositionError, PositionResult};

// ============================================================================
// Position
// ============================================================================

/// Lifecycle status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

/// How a position was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRecord {
    pub reason: CloseReason,
    /// Executable spread captured by the closing trades.
    pub close_spread: Decimal,
    /// Fee paid on the closing trades, per unit.
    pub close_fee: Decimal,
    pub closed_at_ms: u64,
}

/// A hedged pair position: long the buy leg, short the sell leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub direction: Direction,
    /// Notional in quote currency.
    pub size: Decimal,
    /// Units held on each leg.
    pub quantity: Size,
    /// Size-weighted executable spread at entry, per unit.
    pub entry_spread: Decimal,
    /// Size-weighted opening fee, per unit.
    pub entry_fee: Decimal,
    pub entry_timestamp_ms: u64,
    pub status: PositionStatus,
    /// Number of ADDs applied.
    pub add_count: u32,
    pub realized_pnl: Option<Decimal>,
    pub close: Option<CloseRecord>,
}

impl Position {
    /// Create a new OPEN position.
    #[must_use]
    pub fn open(
        id: PositionId,
        direction: Direction,
        size: Decimal,
        quantity: Size,
        entry_spread: Decimal,
        entry_fee: Decimal,
        entry_timestamp_ms: u64,
    ) -> Self {
        Self {
            id,
            direction,
            size,
            quantity,
            entry_spread,
            entry_fee,
            entry_timestamp_ms,
            status: PositionStatus::Open,
            add_count: 0,
            realized_pnl: None,
            close: None,
        }
    }

    /// Holding time in millis.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entry_timestamp_ms)
    }

    /// Holding time at close, in seconds. `None` while not closed.
    #[must_use]
    pub fn holding_secs(&self) -> Option<u64> {
        self.close
            .as_ref()
            .map(|c| c.closed_at_ms.saturating_sub(self.entry_timestamp_ms) / 1000)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// New terms after an ADD fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeUpdate {
    pub size: Decimal,
    pub quantity: Size,
    pub entry_spread: Decimal,
    pub entry_fee: Decimal,
}

impl SizeUpdate {
    /// Merge an additional fill into `position`, weighting spread and fee by
    /// notional.
    #[must_use]
    pub fn weighted(
        position: &Position,
        add_size: Decimal,
        add_quantity: Size,
        add_spread: Decimal,
        add_fee: Decimal,
    ) -> Self {
        let size = position.size + add_size;
        let (entry_spread, entry_fee) = if size.is_zero() {
            (position.entry_spread, position.entry_fee)
        } else {
            (
                (position.entry_spread * position.size + add_spread * add_size) / size,
                (position.entry_fee * position.size + add_fee * add_size) / size,
            )
        };
        Self {
            size,
            quantity: position.quantity + add_quantity,
            entry_spread,
            entry_fee,
        }
    }
}

// ============================================================================
// Limits
// ============================================================================

/// Caps enforced on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLimits {
    /// Maximum number of active positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Maximum sum of active notionals.
    #[serde(default = "default_max_total_notional")]
    pub max_total_notional: Decimal,
    /// Maximum notional of a single position, including ADDs.
    #[serde(default = "default_max_single_position")]
    pub max_single_position: Decimal,
}

fn default_max_positions() -> usize {
    2
}

fn default_max_total_notional() -> Decimal {
    Decimal::from(200)
}

fn default_max_single_position() -> Decimal {
    Decimal::from(150)
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_total_notional: default_max_total_notional(),
            max_single_position: default_max_single_position(),
        }
    }
}

impl LedgerLimits {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_positions == 0 {
            return Err("max_positions must be at least 1".to_string());
        }
        if self.max_total_notional <= Decimal::ZERO {
            return Err(format!(
                "max_total_notional ({}) must be positive",
                self.max_total_notional
            ));
        }
        if self.max_single_position <= Decimal::ZERO {
            return Err(format!(
                "max_single_position ({}) must be positive",
                self.max_single_position
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Cumulative statistics over the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage, 0-100.
    pub win_rate: Decimal,
    pub total_realized_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub avg_holding_secs: u64,
}

/// Unrealized mark of one active position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMark {
    pub position_id: PositionId,
    pub unrealized_pnl: Option<Decimal>,
}

/// Portfolio view derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub position_count: usize,
    pub total_notional: Decimal,
    pub positions: Vec<PositionMark>,
    /// Sum over positions that could be marked.
    pub total_unrealized_pnl: Decimal,
}

// ============================================================================
// PositionLedger
// ============================================================================

/// In-memory ledger of active and archived positions.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    limits: LedgerLimits,
    active: Vec<Position>,
    archive: Vec<Position>,
}

impl PositionLedger {
    #[must_use]
    pub fn new(limits: LedgerLimits) -> Self {
        Self {
            limits,
            active: Vec::new(),
            archive: Vec::new(),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    /// Active positions (OPEN and CLOSING) in insertion order.
    #[must_use]
    pub fn active_positions(&self) -> &[Position] {
        &self.active
    }

    /// Closed positions in close order.
    #[must_use]
    pub fn archive(&self) -> &[Position] {
        &self.archive
    }

    #[must_use]
    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.active.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sum of active notionals, CLOSING positions included.
    #[must_use]
    pub fn aggregate_exposure(&self) -> Decimal {
        self.active.iter().map(|p| p.size).sum()
    }

    /// Direction of the active set's net exposure, if any.
    #[must_use]
    pub fn net_direction(&self) -> Option<Direction> {
        self.active.first().map(|p| p.direction)
    }

    /// Whether a new position of `size` would fit the caps.
    #[must_use]
    pub fn can_open(&self, size: Decimal) -> bool {
        self.active.len() < self.limits.max_positions
            && size <= self.limits.max_single_position
            && self.aggregate_exposure() + size <= self.limits.max_total_notional
    }

    /// Whether `id` can grow by `add_size` within the caps.
    #[must_use]
    pub fn can_add(&self, id: &PositionId, add_size: Decimal) -> bool {
        match self.get(id) {
            Some(p) => {
                p.is_open()
                    && p.size + add_size <= self.limits.max_single_position
                    && self.aggregate_exposure() + add_size <= self.limits.max_total_notional
            }
            None => false,
        }
    }

    /// Fresh id for a position opened at `at`, unique across active and
    /// archived positions.
    #[must_use]
    pub fn next_id(&self, direction: Direction, at: DateTime<Utc>) -> PositionId {
        let mut seq = 0;
        loop {
            let id = PositionId::generate(direction, at, seq);
            let taken = self.active.iter().chain(self.archive.iter()).any(|p| p.id == id);
            if !taken {
                return id;
            }
            seq += 1;
        }
    }

    /// Insert a new OPEN position.
    pub fn add(&mut self, position: Position) -> PositionResult<()> {
        if position.status != PositionStatus::Open {
            return Err(violation(&position.id, "new position must be OPEN"));
        }
        if position.size <= Decimal::ZERO || !position.quantity.is_positive() {
            return Err(violation(&position.id, "size must be positive"));
        }
        if self.active.iter().chain(self.archive.iter()).any(|p| p.id == position.id) {
            return Err(violation(&position.id, "duplicate position id"));
        }
        if let Some(net) = self.net_direction() {
            if net != position.direction {
                return Err(violation(
                    &position.id,
                    &format!("net exposure is {net}, cannot open {}", position.direction),
                ));
            }
        }
        if self.active.len() + 1 > self.limits.max_positions {
            return Err(violation(
                &position.id,
                &format!("position count would exceed {}", self.limits.max_positions),
            ));
        }
        self.check_single(&position.id, position.size)?;
        self.check_total(&position.id, self.aggregate_exposure() + position.size)?;

        debug!(
            position_id = %position.id,
            direction = %position.direction,
            size = %position.size,
            entry_spread = %position.entry_spread,
            "Ledger: position added"
        );
        self.active.push(position);
        Ok(())
    }

    /// Replace size and weighted entry terms of an OPEN position.
    pub fn update_size(&mut self, id: &PositionId, update: SizeUpdate) -> PositionResult<()> {
        let exposure = self.aggregate_exposure();
        let position = self.find(id)?;
        if position.status != PositionStatus::Open {
            return Err(violation(id, "only OPEN positions can be resized"));
        }
        if update.size <= Decimal::ZERO || !update.quantity.is_positive() {
            return Err(violation(id, "size must be positive"));
        }
        let old_size = position.size;
        self.check_single(id, update.size)?;
        self.check_total(id, exposure - old_size + update.size)?;

        let position = self.find_mut(id)?;
        if update.size > old_size {
            position.add_count += 1;
        }
        position.size = update.size;
        position.quantity = update.quantity;
        position.entry_spread = update.entry_spread;
        position.entry_fee = update.entry_fee;
        debug!(
            position_id = %id,
            size = %position.size,
            entry_spread = %position.entry_spread,
            "Ledger: position resized"
        );
        Ok(())
    }

    /// OPEN → CLOSING.
    pub fn mark_closing(&mut self, id: &PositionId) -> PositionResult<()> {
        let position = self.find_mut(id)?;
        if position.status != PositionStatus::Open {
            return Err(violation(
                id,
                &format!("cannot mark {:?} position as CLOSING", position.status),
            ));
        }
        position.status = PositionStatus::Closing;
        debug!(position_id = %id, "Ledger: position closing");
        Ok(())
    }

    /// CLOSING → OPEN for a position parked by a failed close, once the
    /// venue side has been squared by hand.
    pub fn reopen(&mut self, id: &PositionId) -> PositionResult<()> {
        let position = self.find_mut(id)?;
        if position.status != PositionStatus::Closing {
            return Err(violation(
                id,
                &format!("cannot reopen {:?} position", position.status),
            ));
        }
        position.status = PositionStatus::Open;
        info!(position_id = %id, "Ledger: parked position reopened");
        Ok(())
    }

    /// Reopen every parked position. Returns their ids.
    pub fn reopen_parked(&mut self) -> Vec<PositionId> {
        let mut reopened = Vec::new();
        for position in &mut self.active {
            if position.status == PositionStatus::Closing {
                position.status = PositionStatus::Open;
                reopened.push(position.id.clone());
            }
        }
        if !reopened.is_empty() {
            info!(positions = ?reopened, "Ledger: parked positions reopened");
        }
        reopened
    }

    /// CLOSING → CLOSED. Moves the position to the archive and returns it.
    pub fn mark_closed(
        &mut self,
        id: &PositionId,
        realized_pnl: Decimal,
        close: CloseRecord,
    ) -> PositionResult<Position> {
        let idx = self
            .active
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| violation(id, "unknown position"))?;
        if self.active[idx].status != PositionStatus::Closing {
            return Err(violation(
                id,
                &format!(
                    "cannot mark {:?} position as CLOSED",
                    self.active[idx].status
                ),
            ));
        }
        let mut position = self.active.remove(idx);
        position.status = PositionStatus::Closed;
        position.realized_pnl = Some(realized_pnl);
        position.close = Some(close);
        debug!(position_id = %id, realized_pnl = %realized_pnl, "Ledger: position closed");
        self.archive.push(position.clone());
        Ok(position)
    }

    /// Aggregate statistics over closed positions.
    #[must_use]
    pub fn statistics(&self) -> TradeStats {
        let total_trades = self.archive.len();
        if total_trades == 0 {
            return TradeStats::default();
        }
        let pnls: Vec<Decimal> = self
            .archive
            .iter()
            .map(|p| p.realized_pnl.unwrap_or_default())
            .collect();
        let winning_trades = pnls.iter().filter(|p| **p > Decimal::ZERO).count();
        let losing_trades = pnls.iter().filter(|p| **p < Decimal::ZERO).count();
        let total_realized_pnl: Decimal = pnls.iter().sum();
        let count = Decimal::from(total_trades as u64);
        let holding_total: u64 = self.archive.iter().filter_map(Position::holding_secs).sum();

        TradeStats {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: (Decimal::from(winning_trades as u64) / count * Decimal::ONE_HUNDRED)
                .round_dp(2),
            total_realized_pnl,
            avg_pnl: total_realized_pnl / count,
            avg_holding_secs: holding_total / total_trades as u64,
        }
    }

    /// Derived portfolio view. `mark` prices one position, `None` when it
    /// cannot be marked this tick.
    pub fn portfolio_state<F>(&self, mut mark: F) -> PortfolioState
    where
        F: FnMut(&Position) -> Option<Decimal>,
    {
        let positions: Vec<PositionMark> = self
            .active
            .iter()
            .map(|p| PositionMark {
                position_id: p.id.clone(),
                unrealized_pnl: mark(p),
            })
            .collect();
        let total_unrealized_pnl = positions.iter().filter_map(|m| m.unrealized_pnl).sum();
        PortfolioState {
            position_count: self.active.len(),
            total_notional: self.aggregate_exposure(),
            positions,
            total_unrealized_pnl,
        }
    }

    fn find(&self, id: &PositionId) -> PositionResult<&Position> {
        self.get(id).ok_or_else(|| violation(id, "unknown position"))
    }

    fn find_mut(&mut self, id: &PositionId) -> PositionResult<&mut Position> {
        self.active
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| violation(id, "unknown position"))
    }

    fn check_single(&self, id: &PositionId, size: Decimal) -> PositionResult<()> {
        if size > self.limits.max_single_position {
            return Err(violation(
                id,
                &format!(
                    "size {size} exceeds max_single_position {}",
                    self.limits.max_single_position
                ),
            ));
        }
        Ok(())
    }

    fn check_total(&self, id: &PositionId, exposure: Decimal) -> PositionResult<()> {
        if exposure > self.limits.max_total_notional {
            return Err(violation(
                id,
                &format!(
                    "exposure {exposure} exceeds max_total_notional {}",
                    self.limits.max_total_notional
                ),
            ));
        }
        Ok(())
    }
}

fn violation(id: &PositionId, reason: &str) -> PositionError {
    PositionError::LedgerInvariantViolation {
        position_id: id.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;

    fn limits() -> LedgerLimits {
        LedgerLimits {
            max_positions: 2,
            max_total_notional: dec!(200),
            max_single_position: dec!(150),
        }
    }

    fn pos(id: &str, direction: Direction, size: Decimal) -> Position {
        Position::open(
            PositionId::new(id),
            direction,
            size,
            Size::new(dec!(0.25)),
            dec!(0.45),
            dec!(0.024),
            1_000,
        )
    }

    fn close_record(reason: CloseReason) -> CloseRecord {
        CloseRecord {
            reason,
            close_spread: dec!(0.10),
            close_fee: dec!(0.024),
            closed_at_ms: 61_000,
        }
    }

    #[test]
    fn test_add_and_exposure() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        ledger.add(pos("p2", Direction::AToB, dec!(50))).unwrap();

        assert_eq!(ledger.active_count(), 2);
        assert_eq!(ledger.aggregate_exposure(), dec!(150));
        let ids: Vec<&str> = ledger.active_positions().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn test_add_rejects_count_cap() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(50))).unwrap();
        ledger.add(pos("p2", Direction::AToB, dec!(50))).unwrap();
        let err = ledger.add(pos("p3", Direction::AToB, dec!(50))).unwrap_err();
        assert!(matches!(err, PositionError::LedgerInvariantViolation { .. }));
        assert_eq!(ledger.active_count(), 2);
    }

    #[test]
    fn test_add_rejects_notional_cap() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(150))).unwrap();
        assert!(ledger.add(pos("p2", Direction::AToB, dec!(60))).is_err());
        assert_eq!(ledger.aggregate_exposure(), dec!(150));
    }

    #[test]
    fn test_add_rejects_opposite_direction() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(50))).unwrap();
        assert!(ledger.add(pos("p2", Direction::BToA, dec!(50))).is_err());
    }

    #[test]
    fn test_portfolio_state_skips_unmarked_positions() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        ledger.add(pos("p2", Direction::AToB, dec!(50))).unwrap();

        let state = ledger.portfolio_state(|p| (p.id.as_str() == "p1").then_some(dec!(0.12)));
        assert_eq!(state.position_count, 2);
        assert_eq!(state.total_notional, dec!(150));
        assert_eq!(state.total_unrealized_pnl, dec!(0.12));
        assert_eq!(state.positions[1].unrealized_pnl, None);
    }

    #[test]
    fn test_add_rejects_non_positive_size() {
        let mut ledger = PositionLedger::new(limits());
        assert!(ledger.add(pos("p1", Direction::AToB, dec!(0))).is_err());
        assert!(ledger.active_positions().is_empty());
    }

    #[test]
    fn test_update_size_weighted() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        let id = PositionId::new("p1");

        let update = SizeUpdate::weighted(
            ledger.get(&id).unwrap(),
            dec!(50),
            Size::new(dec!(0.125)),
            dec!(0.75),
            dec!(0.024),
        );
        ledger.update_size(&id, update).unwrap();

        let p = ledger.get(&id).unwrap();
        assert_eq!(p.size, dec!(150));
        assert_eq!(p.quantity.inner(), dec!(0.375));
        // (0.45 * 100 + 0.75 * 50) / 150
        assert_eq!(p.entry_spread, dec!(0.55));
        assert_eq!(p.add_count, 1);
    }

    #[test]
    fn test_update_size_rejects_single_cap() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        let id = PositionId::new("p1");
        let before = ledger.get(&id).unwrap().clone();

        let update = SizeUpdate::weighted(&before, dec!(100), Size::new(dec!(0.25)), dec!(0.8), dec!(0.02));
        assert!(ledger.update_size(&id, update).is_err());
        assert_eq!(ledger.get(&id).unwrap(), &before);
    }

    #[test]
    fn test_status_transitions() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        let id = PositionId::new("p1");

        // CLOSED requires CLOSING first
        assert!(ledger
            .mark_closed(&id, dec!(0.1), close_record(CloseReason::Timeout))
            .is_err());

        ledger.mark_closing(&id).unwrap();
        assert!(ledger.mark_closing(&id).is_err());
        // resizing a CLOSING position is rejected
        let p = ledger.get(&id).unwrap().clone();
        let update = SizeUpdate::weighted(&p, dec!(10), Size::new(dec!(0.01)), dec!(0.5), dec!(0.02));
        assert!(ledger.update_size(&id, update).is_err());

        let closed = ledger
            .mark_closed(&id, dec!(0.1), close_record(CloseReason::Timeout))
            .unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl, Some(dec!(0.1)));
        assert!(ledger.active_positions().is_empty());
        assert_eq!(ledger.archive().len(), 1);

        // gone from the active set
        assert!(ledger.mark_closing(&id).is_err());
    }

    #[test]
    fn test_closing_counts_toward_exposure() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(150))).unwrap();
        ledger.mark_closing(&PositionId::new("p1")).unwrap();
        assert_eq!(ledger.aggregate_exposure(), dec!(150));
        assert!(!ledger.can_open(dec!(100)));
    }

    #[test]
    fn test_parked_position_reopens() {
        let mut ledger = PositionLedger::new(limits());
        ledger.add(pos("p1", Direction::AToB, dec!(100))).unwrap();
        ledger.add(pos("p2", Direction::AToB, dec!(50))).unwrap();
        let id = PositionId::new("p1");

        assert!(ledger.reopen(&id).is_err());
        ledger.mark_closing(&id).unwrap();
        assert_eq!(ledger.reopen_parked(), vec![id.clone()]);
        assert!(ledger.get(&id).unwrap().is_open());
        assert!(ledger.reopen_parked().is_empty());

        ledger.mark_closing(&id).unwrap();
        ledger.reopen(&id).unwrap();
        assert_eq!(ledger.aggregate_exposure(), dec!(150));
    }

    #[test]
    fn test_statistics() {
        let mut ledger = PositionLedger::new(limits());
        for (id, pnl) in [("p1", dec!(0.30)), ("p2", dec!(-0.10))] {
            ledger.add(pos(id, Direction::AToB, dec!(100))).unwrap();
            let id = PositionId::new(id);
            ledger.mark_closing(&id).unwrap();
            ledger
                .mark_closed(&id, pnl, close_record(CloseReason::TakeProfit))
                .unwrap();
        }

        let stats = ledger.statistics();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, dec!(50));
        assert_eq!(stats.total_realized_pnl, dec!(0.20));
        assert_eq!(stats.avg_pnl, dec!(0.10));
        assert_eq!(stats.avg_holding_secs, 60);
    }

    #[test]
    fn test_next_id_unique_within_second() {
        let mut ledger = PositionLedger::new(limits());
        let at = Utc::now();
        let first = ledger.next_id(Direction::AToB, at);
        ledger
            .add(Position::open(
                first.clone(),
                Direction::AToB,
                dec!(100),
                Size::new(dec!(0.25)),
                dec!(0.4),
                dec!(0.02),
                0,
            ))
            .unwrap();
        let second = ledger.next_id(Direction::AToB, at);
        assert_ne!(first, second);
        assert!(second.as_str().ends_with("_1"));
    }

    #[test]
    fn test_random_mutations_never_exceed_caps() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let limits = limits();

        for _ in 0..200 {
            let mut ledger = PositionLedger::new(limits.clone());
            let mut counter = 0u32;
            for _ in 0..60 {
                let active: Vec<PositionId> =
                    ledger.active_positions().iter().map(|p| p.id.clone()).collect();
                match rng.gen_range(0..4) {
                    0 => {
                        counter += 1;
                        let direction = if rng.gen_bool(0.5) {
                            Direction::AToB
                        } else {
                            Direction::BToA
                        };
                        let size = Decimal::from(rng.gen_range(1..=180u32));
                        let _ = ledger.add(pos(&format!("p{counter}"), direction, size));
                    }
                    1 if !active.is_empty() => {
                        let id = &active[rng.gen_range(0..active.len())];
                        let p = ledger.get(id).unwrap().clone();
                        let add = Decimal::from(rng.gen_range(1..=120u32));
                        let update =
                            SizeUpdate::weighted(&p, add, Size::new(dec!(0.1)), dec!(0.6), dec!(0.02));
                        let _ = ledger.update_size(id, update);
                    }
                    2 if !active.is_empty() => {
                        let id = &active[rng.gen_range(0..active.len())];
                        let _ = ledger.mark_closing(id);
                    }
                    3 if !active.is_empty() => {
                        let id = &active[rng.gen_range(0..active.len())];
                        let _ = ledger.mark_closed(id, dec!(0.05), close_record(CloseReason::Reversal));
                    }
                    _ => {}
                }

                assert!(ledger.active_count() <= limits.max_positions);
                assert!(ledger.aggregate_exposure() <= limits.max_total_notional);
                for p in ledger.active_positions() {
                    assert!(p.size > Decimal::ZERO);
                    assert!(p.size <= limits.max_single_position);
                    assert_ne!(p.status, PositionStatus::Closed);
                }
                if let Some(net) = ledger.net_direction() {
                    assert!(ledger.active_positions().iter().all(|p| p.direction == net));
                }
            }
        }
    }
}
