//! Engine error types.

use thiserror::Error;
use xarb_detector::DetectorError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Quotes unusable for this tick; nothing was decided.
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

pub type EngineResult<T> = Result<T, EngineError>;
