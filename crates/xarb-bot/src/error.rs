//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] xarb_feed::FeedError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] xarb_core::ExchangeError),

    #[error("Detector error: {0}")]
    Detector(#[from] xarb_detector::DetectorError),

    #[error("Engine error: {0}")]
    Engine(#[from] xarb_engine::EngineError),

    #[error("Executor error: {0}")]
    Executor(#[from] xarb_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] xarb_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] xarb_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
