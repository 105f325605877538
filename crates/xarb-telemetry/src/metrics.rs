//! Prometheus metrics for the xarb engine.
//!
//! Covers the whole decision path:
//! - Quote fetches and per-direction spreads
//! - Sampler resets and stable opportunities
//! - Decisions and execution outcomes
//! - Ledger exposure, realized PnL and the hard-stop latch
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_histogram_vec, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, Histogram,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Quote fetch failures.
/// Labels: instrument, reason
pub static QUOTE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_quote_errors_total",
        "Quote fetch or validation failures",
        &["instrument", "reason"]
    )
    .unwrap()
});

/// Latest executable spread per direction (quote currency per unit).
pub static EXECUTABLE_SPREAD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "xarb_executable_spread",
        "Latest executable spread per direction",
        &["direction"]
    )
    .unwrap()
});

/// Latest fee-adjusted net profit per direction.
pub static NET_PROFIT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "xarb_net_profit",
        "Latest fee-adjusted net profit per direction",
        &["direction"]
    )
    .unwrap()
});

/// Sampler window resets.
/// Labels: reason (sub_threshold/direction_flip/invalid_quote)
pub static SAMPLER_RESETS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_sampler_resets_total",
        "Spread sampler window resets",
        &["reason"]
    )
    .unwrap()
});

/// Ticks on which a stable opportunity was emitted.
pub static STABLE_OPPORTUNITIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_stable_opportunities_total",
        "Ticks with a stable opportunity",
        &["direction"]
    )
    .unwrap()
});

/// Decisions emitted by the engine.
/// Labels: kind (open/add/close_reversal/close_take_profit/close_timeout)
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_decisions_total",
        "Decisions emitted by the engine",
        &["kind"]
    )
    .unwrap()
});

/// Execution outcomes.
/// Labels: kind, outcome (filled/rolled_back/rollback_failed/failed)
pub static EXECUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_executions_total",
        "Execution outcomes by decision kind",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Order placement retries.
pub static ORDER_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_order_retries_total",
        "Order placement retries",
        &["instrument"]
    )
    .unwrap()
});

/// Close fills by liquidity kind (maker/taker).
pub static CLOSE_FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "xarb_close_fills_total",
        "Maker-then-taker close legs by fill kind",
        &["fill_kind"]
    )
    .unwrap()
});

/// Pair execution latency in milliseconds.
pub static EXECUTION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "xarb_execution_latency_ms",
        "Pair execution latency in milliseconds",
        &["kind"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Active positions.
pub static ACTIVE_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("xarb_active_positions", "Active pair positions").unwrap()
});

/// Aggregate active notional.
pub static EXPOSURE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("xarb_exposure_notional", "Aggregate active notional").unwrap()
});

/// Cumulative realized PnL per unit.
pub static REALIZED_PNL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("xarb_realized_pnl_total", "Cumulative realized PnL").unwrap()
});

/// Realized PnL per close, by reason.
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "xarb_trade_pnl",
        "Realized PnL per closed position",
        &["reason"],
        vec![-1.0, -0.5, -0.25, -0.1, 0.0, 0.1, 0.25, 0.5, 1.0, 2.0]
    )
    .unwrap()
});

/// Hard stop state (1 = new exposure halted).
pub static HARD_STOP: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("xarb_hard_stop", "Hard stop latch state (1=triggered)").unwrap()
});

/// Run loop cycle duration in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "xarb_cycle_duration_ms",
        "Run loop cycle duration in milliseconds",
        vec![5.0, 25.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a quote fetch/validation failure.
    pub fn quote_error(instrument: &str, reason: &str) {
        QUOTE_ERRORS_TOTAL
            .with_label_values(&[instrument, reason])
            .inc();
    }

    /// Record the latest spread and net profit for a direction.
    pub fn spread_observed(direction: &str, executable_spread: f64, net_profit: f64) {
        EXECUTABLE_SPREAD
            .with_label_values(&[direction])
            .set(executable_spread);
        NET_PROFIT.with_label_values(&[direction]).set(net_profit);
    }

    /// Record a sampler window reset.
    pub fn sampler_reset(reason: &str) {
        SAMPLER_RESETS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a stable opportunity tick.
    pub fn stable_opportunity(direction: &str) {
        STABLE_OPPORTUNITIES_TOTAL
            .with_label_values(&[direction])
            .inc();
    }

    /// Record an engine decision.
    pub fn decision(kind: &str) {
        DECISIONS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record an execution outcome and its latency.
    pub fn execution(kind: &str, outcome: &str, latency_ms: f64) {
        EXECUTIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
        EXECUTION_LATENCY_MS
            .with_label_values(&[kind])
            .observe(latency_ms);
    }

    /// Record an order placement retry.
    pub fn order_retry(instrument: &str) {
        ORDER_RETRIES_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record one close leg fill kind.
    pub fn close_fill(fill_kind: &str) {
        CLOSE_FILLS_TOTAL.with_label_values(&[fill_kind]).inc();
    }

    /// Update ledger gauges.
    pub fn ledger(active_positions: usize, exposure: f64, realized_pnl_total: f64) {
        ACTIVE_POSITIONS.set(active_positions as i64);
        EXPOSURE.set(exposure);
        REALIZED_PNL.set(realized_pnl_total);
    }

    /// Record a realized close.
    pub fn trade_pnl(reason: &str, pnl: f64) {
        TRADE_PNL.with_label_values(&[reason]).observe(pnl);
    }

    /// Set hard stop gauge.
    pub fn hard_stop(triggered: bool) {
        HARD_STOP.set(if triggered { 1.0 } else { 0.0 });
    }

    /// Record a run loop cycle duration.
    pub fn cycle_duration(duration_ms: f64) {
        CYCLE_DURATION_MS.observe(duration_ms);
    }

    /// Render the default registry in Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
