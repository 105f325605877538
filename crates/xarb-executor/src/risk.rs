//! Hard stop latch.
//!
//! Tripped when a pair execution leaves unhedged exposure that could not be
//! unwound. While latched the engine is asked for closes only; existing
//! positions keep being monitored and closed. Only an operator resets it.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, warn};

use xarb_telemetry::Metrics;

/// Point-in-time view of the latch for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardStopStatus {
    pub triggered: bool,
    pub reason: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Latching circuit breaker for new exposure.
///
/// # Example
/// ```
/// use xarb_executor::HardStopLatch;
///
/// let latch = HardStopLatch::new();
/// assert!(!latch.is_triggered());
///
/// latch.trigger("rollback failed");
/// assert!(latch.is_triggered());
/// assert_eq!(latch.trigger_reason().as_deref(), Some("rollback failed"));
/// ```
#[derive(Debug)]
pub struct HardStopLatch {
    triggered: AtomicBool,
    /// Set on first trigger only.
    trigger_reason: Mutex<Option<String>>,
    trigger_time: Mutex<Option<DateTime<Utc>>>,
}

impl HardStopLatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            trigger_reason: Mutex::new(None),
            trigger_time: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Trip the latch. A second trigger keeps the original reason and time.
    pub fn trigger(&self, reason: &str) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            *self.trigger_reason.lock() = Some(reason.to_string());
            *self.trigger_time.lock() = Some(Utc::now());
            Metrics::hard_stop(true);
            error!(reason, "HARD STOP TRIGGERED: new exposure halted");
        }
    }

    #[must_use]
    pub fn trigger_reason(&self) -> Option<String> {
        self.trigger_reason.lock().clone()
    }

    #[must_use]
    pub fn status(&self) -> HardStopStatus {
        HardStopStatus {
            triggered: self.is_triggered(),
            reason: self.trigger_reason(),
            triggered_at: *self.trigger_time.lock(),
        }
    }

    /// Operator acknowledgment. Returns whether the latch was set.
    pub fn reset(&self) -> bool {
        let was_triggered = self.triggered.swap(false, Ordering::AcqRel);
        *self.trigger_reason.lock() = None;
        *self.trigger_time.lock() = None;
        Metrics::hard_stop(false);
        if was_triggered {
            warn!("HardStop RESET by operator: new exposure allowed");
        }
        was_triggered
    }
}

impl Default for HardStopLatch {
    fn default() -> Self {
        Self::new()
    }
}
