//! Feed error types.

use thiserror::Error;
use xarb_core::{CoreError, ExchangeError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Book parse error for {coin}: {reason}")]
    Parse { coin: String, reason: String },

    #[error("Invalid book value: {0}")]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeedError {
    /// Whether the next poll may succeed without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpClient(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Core(_) | Self::Json(_) => false,
        }
    }
}

impl From<FeedError> for ExchangeError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Status { status: 429, .. } => ExchangeError::RateLimited,
            FeedError::HttpClient(_) | FeedError::Status { .. } => {
                ExchangeError::Transport(e.to_string())
            }
            FeedError::Parse { .. } | FeedError::Core(_) | FeedError::Json(_) => {
                ExchangeError::NoMarketData(e.to_string())
            }
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
