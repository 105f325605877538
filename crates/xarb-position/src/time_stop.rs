//! Holding-time limit for pair positions.
//!
//! A position older than the threshold is closed via maker-then-taker
//! regardless of PnL sign.

use std::time::Duration;

use xarb_core::PositionId;

use crate::ledger::Position;

/// Default holding limit: 1.5 hours.
pub const DEFAULT_POSITION_TIMEOUT_MS: u64 = 90 * 60 * 1000;

/// Checks positions against the holding time threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStop {
    threshold_ms: u64,
}

impl TimeStop {
    #[must_use]
    pub fn new(threshold_ms: u64) -> Self {
        Self { threshold_ms }
    }

    /// Build from a fractional hour count, as the strategy is configured.
    #[must_use]
    pub fn from_hours(hours: f64) -> Self {
        let threshold = Duration::from_secs_f64((hours.max(0.0)) * 3600.0);
        Self::new(threshold.as_millis() as u64)
    }

    #[must_use]
    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// `Some(elapsed_ms)` once the holding time strictly exceeds the threshold.
    #[must_use]
    pub fn check_single(&self, entry_timestamp_ms: u64, now_ms: u64) -> Option<u64> {
        let elapsed_ms = now_ms.saturating_sub(entry_timestamp_ms);
        if elapsed_ms > self.threshold_ms {
            Some(elapsed_ms)
        } else {
            None
        }
    }

    /// Ids of OPEN positions past the threshold.
    #[must_use]
    pub fn expired(&self, positions: &[Position], now_ms: u64) -> Vec<PositionId> {
        positions
            .iter()
            .filter(|p| p.is_open() && self.check_single(p.entry_timestamp_ms, now_ms).is_some())
            .map(|p| p.id.clone())
            .collect()
    }
}

impl Default for TimeStop {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use xarb_core::{Direction, Size};

    #[test]
    fn test_from_hours() {
        assert_eq!(TimeStop::from_hours(1.5).threshold_ms(), DEFAULT_POSITION_TIMEOUT_MS);
        assert_eq!(TimeStop::from_hours(0.0).threshold_ms(), 0);
    }

    #[test]
    fn test_check_single_is_strict() {
        let ts = TimeStop::new(10_000);
        assert_eq!(ts.check_single(1_000, 11_000), None);
        assert_eq!(ts.check_single(1_000, 11_001), Some(10_001));
        // clock going backwards never expires
        assert_eq!(ts.check_single(5_000, 1_000), None);
    }

    #[test]
    fn test_expired_filters_open_positions() {
        let ts = TimeStop::new(10_000);
        let old = Position::open(
            PositionId::new("old"),
            Direction::AToB,
            dec!(100),
            Size::new(dec!(0.25)),
            dec!(0.4),
            dec!(0.02),
            0,
        );
        let mut young = old.clone();
        young.id = PositionId::new("young");
        young.entry_timestamp_ms = 15_000;

        let ids = ts.expired(&[old, young], 20_000);
        assert_eq!(ids, vec![PositionId::new("old")]);
    }
}
