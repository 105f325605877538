//! Prometheus metrics and structured logging for xarb.
//!
//! - Prometheus metrics for spreads, decisions, executions and ledger state
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
