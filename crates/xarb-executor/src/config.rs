//! Execution configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

/// Order placement, retry and maker-window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Placement attempts per leg, first try included.
    #[serde(default = "default_max_leg_retries")]
    pub max_leg_retries: u32,
    /// First retry delay; doubles on every further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Bound on a single exchange call and on waiting for a market fill.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    /// How long a passive close order may rest before the taker fallback.
    #[serde(default = "default_maker_grace_ms")]
    pub maker_grace_ms: u64,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    /// Relative improvement over the near touch for passive orders.
    #[serde(default = "default_limit_price_improvement")]
    pub limit_price_improvement: Decimal,
    /// Quantity precision of both legs.
    #[serde(default = "default_size_decimals")]
    pub size_decimals: u32,
}

fn default_max_leg_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_order_timeout_ms() -> u64 {
    5_000
}

fn default_maker_grace_ms() -> u64 {
    3_000
}

fn default_fill_poll_interval_ms() -> u64 {
    250
}

fn default_limit_price_improvement() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_size_decimals() -> u32 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_leg_retries: default_max_leg_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            order_timeout_ms: default_order_timeout_ms(),
            maker_grace_ms: default_maker_grace_ms(),
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            limit_price_improvement: default_limit_price_improvement(),
            size_decimals: default_size_decimals(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.max_leg_retries == 0 {
            return Err(ExecutorError::Config(
                "max_leg_retries must be at least 1".to_string(),
            ));
        }
        if self.order_timeout_ms == 0 || self.fill_poll_interval_ms == 0 {
            return Err(ExecutorError::Config(
                "order_timeout_ms and fill_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.limit_price_improvement < Decimal::ZERO
            || self.limit_price_improvement >= Decimal::ONE
        {
            return Err(ExecutorError::Config(format!(
                "limit_price_improvement must be in [0, 1), got {}",
                self.limit_price_improvement
            )));
        }
        Ok(())
    }

    pub(crate) fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub(crate) fn maker_grace(&self) -> Duration {
        Duration::from_millis(self.maker_grace_ms)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    /// Delay before attempt `attempt` (1-based retry count).
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
