//! Application configuration.
//!
//! One TOML file, one section per component. Every field has a serde
//! default so a partial file is valid.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use xarb_core::InstrumentTag;
use xarb_detector::DetectorConfig;
use xarb_engine::StrategyConfig;
use xarb_executor::ExecutionConfig;
use xarb_feed::DEFAULT_INFO_URL;
use xarb_persistence::PersistenceConfig;
use xarb_position::LedgerLimits;

use crate::error::{AppError, AppResult};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Quotes, sampling and decisions; nothing is executed.
    #[default]
    Observation,
    /// Decisions executed against the simulated venue at live quotes.
    Paper,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Paper => "paper",
        }
    }
}

/// The traded pair. `AToB` buys `a` and sells `b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegsConfig {
    #[serde(default = "default_leg_a")]
    pub a: InstrumentTag,
    #[serde(default = "default_leg_b")]
    pub b: InstrumentTag,
}

fn default_leg_a() -> InstrumentTag {
    InstrumentTag::new("flx:TSLA")
}

fn default_leg_b() -> InstrumentTag {
    InstrumentTag::new("xyz:TSLA")
}

impl Default for LegsConfig {
    fn default() -> Self {
        Self {
            a: default_leg_a(),
            b: default_leg_b(),
        }
    }
}

/// Run loop pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling period (ms).
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,
    /// Status summary every N cycles.
    #[serde(default = "default_status_interval_cycles")]
    pub status_interval_cycles: u64,
    /// Attempts per leg before the cycle is skipped.
    #[serde(default = "default_quote_fetch_retries")]
    pub quote_fetch_retries: u32,
    #[serde(default = "default_quote_retry_delay_ms")]
    pub quote_retry_delay_ms: u64,
    /// HTTP timeout for the info endpoint (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_monitor_interval_ms() -> u64 {
    2_000
}

fn default_status_interval_cycles() -> u64 {
    30
}

fn default_quote_fetch_retries() -> u32 {
    3
}

fn default_quote_retry_delay_ms() -> u64 {
    250
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            status_interval_cycles: default_status_interval_cycles(),
            quote_fetch_retries: default_quote_fetch_retries(),
            quote_retry_delay_ms: default_quote_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn quote_retry_delay(&self) -> Duration {
        Duration::from_millis(self.quote_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// HTTP status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusServerConfig {
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

fn default_status_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    8080
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            bind_address: default_bind_address(),
            port: default_status_port(),
        }
    }
}

impl StatusServerConfig {
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid status server address: {e}")))
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    /// Info endpoint for top-of-book quotes.
    #[serde(default = "default_info_url")]
    pub info_url: String,
    #[serde(default)]
    pub legs: LegsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub limits: LedgerLimits,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

fn default_info_url() -> String {
    DEFAULT_INFO_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            info_url: default_info_url(),
            legs: LegsConfig::default(),
            monitor: MonitorConfig::default(),
            detector: DetectorConfig::default(),
            strategy: StrategyConfig::default(),
            limits: LedgerLimits::default(),
            execution: ExecutionConfig::default(),
            persistence: PersistenceConfig::default(),
            status_server: StatusServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section and the constraints between them.
    pub fn validate(&self) -> AppResult<()> {
        if self.legs.a == self.legs.b {
            return Err(AppError::Config(format!(
                "legs.a and legs.b must differ (both {})",
                self.legs.a
            )));
        }
        if self.monitor.interval_ms == 0 {
            return Err(AppError::Config("monitor.interval_ms must be positive".to_string()));
        }
        if self.monitor.quote_fetch_retries == 0 {
            return Err(AppError::Config(
                "monitor.quote_fetch_retries must be at least 1".to_string(),
            ));
        }
        self.detector
            .validate()
            .map_err(|e| AppError::Config(format!("detector: {e}")))?;
        self.strategy
            .validate()
            .map_err(|e| AppError::Config(format!("strategy: {e}")))?;
        self.limits
            .validate()
            .map_err(|e| AppError::Config(format!("limits: {e}")))?;
        self.execution.validate()?;

        if self.strategy.initial_position_size > self.limits.max_single_position {
            return Err(AppError::Config(format!(
                "strategy.initial_position_size ({}) exceeds limits.max_single_position ({})",
                self.strategy.initial_position_size, self.limits.max_single_position
            )));
        }
        Ok(())
    }

    pub fn is_observation_mode(&self) -> bool {
        self.mode == OperatingMode::Observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.is_observation_mode());
        assert_eq!(config.legs.a.as_str(), "flx:TSLA");
        assert_eq!(config.legs.b.as_str(), "xyz:TSLA");
        assert_eq!(config.monitor.interval_ms, 2_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            mode = "paper"

            [legs]
            a = "flx:NVDA"
            b = "xyz:NVDA"

            [strategy]
            take_profit_target = "0.50"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, OperatingMode::Paper);
        assert_eq!(config.legs.a.as_str(), "flx:NVDA");
        assert_eq!(config.strategy.take_profit_target, dec!(0.50));
        assert_eq!(config.strategy.initial_position_size, dec!(100));
        assert_eq!(config.execution.maker_grace_ms, 3_000);
        assert_eq!(config.detector.stability_samples, 2);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = AppConfig::from_toml(r#"mode = "trading""#);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_identical_legs_rejected() {
        let mut config = AppConfig::default();
        config.legs.b = config.legs.a.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_size_above_single_cap_rejected() {
        let mut config = AppConfig::default();
        config.strategy.initial_position_size = dec!(200);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_single_position"));
    }

    #[test]
    fn test_status_server_address() {
        let config = StatusServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("mode"));
        assert!(toml_str.contains("[legs]"));
    }
}
