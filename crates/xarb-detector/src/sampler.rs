//! Spread sampler and stabilizer.
//!
//! Builds one [`SpreadObservation`] per polling tick (the better of the two
//! directions) and only reports a [`StableOpportunity`] once the last N
//! observations point the same way and each clears the minimum net profit.
//! A sub-threshold tick, invalid data or a direction flip restarts the count.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use xarb_core::{Direction, Price, QuotePair};
use xarb_telemetry::Metrics;

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};
use crate::fee::{ProfitCalculator, ProfitEstimate};

/// Spread state of the pair at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadObservation {
    pub direction: Direction,
    pub raw_spread: Decimal,
    pub executable_spread: Decimal,
    pub open_fee: Decimal,
    pub net_profit: Decimal,
    pub timestamp_ms: u64,
}

impl SpreadObservation {
    fn from_estimate(est: &ProfitEstimate, timestamp_ms: u64) -> Self {
        Self {
            direction: est.direction,
            raw_spread: est.raw_spread,
            executable_spread: est.executable_spread,
            open_fee: est.open_fee,
            net_profit: est.net_profit,
            timestamp_ms,
        }
    }
}

/// Opportunity confirmed over N consecutive ticks. Values are from the
/// latest tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableOpportunity {
    pub direction: Direction,
    pub executable_spread: Decimal,
    pub net_profit: Decimal,
    pub open_fee: Decimal,
    pub avg_price: Price,
    /// Consistent samples backing this opportunity.
    pub samples: usize,
    pub quotes: QuotePair,
    pub observed_at_ms: u64,
}

/// Rolling-window stabilizer over spread observations.
#[derive(Debug, Clone)]
pub struct SpreadSampler {
    calculator: ProfitCalculator,
    min_net_profit: Decimal,
    required: usize,
    window: VecDeque<SpreadObservation>,
    last: Option<SpreadObservation>,
}

impl SpreadSampler {
    #[must_use]
    pub fn new(config: &DetectorConfig) -> Self {
        let required = config.stability_samples.max(1);
        Self {
            calculator: config.calculator(),
            min_net_profit: config.min_net_profit,
            required,
            window: VecDeque::with_capacity(required),
            last: None,
        }
    }

    /// Feed one tick. `Ok(None)` means undecided, not a negative signal.
    pub fn observe(
        &mut self,
        quotes: &QuotePair,
        now_ms: u64,
    ) -> DetectorResult<Option<StableOpportunity>> {
        let est = match self.calculator.best_opportunity(quotes, now_ms) {
            Ok(est) => est,
            Err(e) => {
                if let DetectorError::InvalidQuote { reason, .. } = &e {
                    self.reset_with(reason.label());
                }
                self.last = None;
                return Err(e);
            }
        };
        self.record_metrics(quotes);

        let obs = SpreadObservation::from_estimate(&est, now_ms);
        self.last = Some(obs.clone());

        if obs.net_profit <= self.min_net_profit {
            self.reset_with("sub_threshold");
            return Ok(None);
        }

        if let Some(back) = self.window.back() {
            if back.direction != obs.direction {
                debug!(
                    from = %back.direction,
                    to = %obs.direction,
                    "Sampler: direction flip, window restarted"
                );
                self.reset_with("direction_flip");
            }
        }

        self.window.push_back(obs);
        while self.window.len() > self.required {
            self.window.pop_front();
        }

        if self.window.len() < self.required {
            trace!(
                direction = %est.direction,
                samples = self.window.len(),
                required = self.required,
                "Sampler: collecting"
            );
            return Ok(None);
        }

        Metrics::stable_opportunity(est.direction.as_str());
        Ok(Some(StableOpportunity {
            direction: est.direction,
            executable_spread: est.executable_spread,
            net_profit: est.net_profit,
            open_fee: est.open_fee,
            avg_price: est.avg_price,
            samples: self.window.len(),
            quotes: quotes.clone(),
            observed_at_ms: now_ms,
        }))
    }

    /// Latest observation, stable or not.
    #[must_use]
    pub fn last_observation(&self) -> Option<&SpreadObservation> {
        self.last.as_ref()
    }

    /// Consistent samples collected so far.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn required_samples(&self) -> usize {
        self.required
    }

    #[must_use]
    pub fn calculator(&self) -> &ProfitCalculator {
        &self.calculator
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    fn reset_with(&mut self, reason: &str) {
        if !self.window.is_empty() {
            Metrics::sampler_reset(reason);
        }
        self.window.clear();
    }

    fn record_metrics(&self, quotes: &QuotePair) {
        for direction in Direction::ALL {
            let est = self.calculator.estimate(quotes, direction);
            Metrics::spread_observed(
                direction.as_str(),
                est.executable_spread.to_f64().unwrap_or(0.0),
                est.net_profit.to_f64().unwrap_or(0.0),
            );
        }
    }
}
