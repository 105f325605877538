//! Detector configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fee::{FeeSchedule, ProfitCalculator};

/// Configuration for opportunity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum fee-adjusted profit per unit for a sample to qualify.
    #[serde(default = "default_min_net_profit")]
    pub min_net_profit: Decimal,
    /// Consecutive same-direction qualifying samples required.
    #[serde(default = "default_stability_samples")]
    pub stability_samples: usize,
    /// Quotes older than this are rejected.
    #[serde(default = "default_max_quote_age_ms")]
    pub max_quote_age_ms: u64,
    #[serde(default)]
    pub fees: FeeSchedule,
}

fn default_min_net_profit() -> Decimal {
    Decimal::new(15, 2) // $0.15
}

fn default_stability_samples() -> usize {
    2
}

fn default_max_quote_age_ms() -> u64 {
    5_000
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_net_profit: default_min_net_profit(),
            stability_samples: default_stability_samples(),
            max_quote_age_ms: default_max_quote_age_ms(),
            fees: FeeSchedule::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.stability_samples == 0 {
            return Err("stability_samples must be at least 1".to_string());
        }
        if self.min_net_profit.is_sign_negative() {
            return Err(format!(
                "min_net_profit ({}) must be non-negative",
                self.min_net_profit
            ));
        }
        if self.max_quote_age_ms == 0 {
            return Err("max_quote_age_ms must be positive".to_string());
        }
        self.fees.validate()
    }

    /// Calculator configured with this fee schedule and staleness bound.
    #[must_use]
    pub fn calculator(&self) -> ProfitCalculator {
        ProfitCalculator::new(self.fees.clone(), self.max_quote_age_ms)
    }
}
