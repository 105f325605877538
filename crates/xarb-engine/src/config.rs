//! Strategy thresholds for the decision engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position sizing and close/add thresholds.
///
/// Spread and PnL thresholds are per unit of the underlying; sizes are
/// notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Notional of a fresh OPEN.
    #[serde(default = "default_initial_position_size")]
    pub initial_position_size: Decimal,
    /// Notional added by one ADD.
    #[serde(default = "default_add_position_size")]
    pub add_position_size: Decimal,
    /// ADD requires the spread to widen by more than this over entry.
    #[serde(default = "default_add_spread_increase")]
    pub add_spread_increase: Decimal,
    /// ADD requires the current spread to be at least this.
    #[serde(default = "default_add_min_spread")]
    pub add_min_spread: Decimal,
    /// Opposite-direction executable spread that triggers a reversal close.
    #[serde(default = "default_reversal_min_spread")]
    pub reversal_min_spread: Decimal,
    /// Unrealized PnL that triggers a take-profit close (strictly above).
    #[serde(default = "default_take_profit_target")]
    pub take_profit_target: Decimal,
    /// Holding time after which a position is closed regardless of PnL.
    #[serde(default = "default_position_timeout_hours")]
    pub position_timeout_hours: f64,
}

fn default_initial_position_size() -> Decimal {
    Decimal::from(100)
}

fn default_add_position_size() -> Decimal {
    Decimal::from(50)
}

fn default_add_spread_increase() -> Decimal {
    Decimal::new(20, 2) // $0.20
}

fn default_add_min_spread() -> Decimal {
    Decimal::new(60, 2) // $0.60
}

fn default_reversal_min_spread() -> Decimal {
    Decimal::new(15, 2) // $0.15
}

fn default_take_profit_target() -> Decimal {
    Decimal::new(35, 2) // $0.35
}

fn default_position_timeout_hours() -> f64 {
    1.5
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            initial_position_size: default_initial_position_size(),
            add_position_size: default_add_position_size(),
            add_spread_increase: default_add_spread_increase(),
            add_min_spread: default_add_min_spread(),
            reversal_min_spread: default_reversal_min_spread(),
            take_profit_target: default_take_profit_target(),
            position_timeout_hours: default_position_timeout_hours(),
        }
    }
}

impl StrategyConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_position_size <= Decimal::ZERO {
            return Err(format!(
                "initial_position_size ({}) must be positive",
                self.initial_position_size
            ));
        }
        if self.add_position_size <= Decimal::ZERO {
            return Err(format!(
                "add_position_size ({}) must be positive",
                self.add_position_size
            ));
        }
        if self.add_spread_increase.is_sign_negative() {
            return Err(format!(
                "add_spread_increase ({}) must be non-negative",
                self.add_spread_increase
            ));
        }
        if !(self.position_timeout_hours.is_finite() && self.position_timeout_hours > 0.0) {
            return Err(format!(
                "position_timeout_hours ({}) must be positive",
                self.position_timeout_hours
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = StrategyConfig::default();
        assert_eq!(config.initial_position_size, dec!(100));
        assert_eq!(config.add_spread_increase, dec!(0.20));
        assert_eq!(config.add_min_spread, dec!(0.60));
        assert_eq!(config.reversal_min_spread, dec!(0.15));
        assert_eq!(config.take_profit_target, dec!(0.35));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let config = StrategyConfig {
            position_timeout_hours: 0.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config: StrategyConfig =
            toml::from_str("take_profit_target = \"0.50\"\nposition_timeout_hours = 2.0").unwrap();
        assert_eq!(config.take_profit_target, dec!(0.50));
        assert_eq!(config.position_timeout_hours, 2.0);
        assert_eq!(config.add_min_spread, dec!(0.60));
    }
}
