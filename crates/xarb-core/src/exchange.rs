//! Exchange connectivity seam.
//!
//! Everything the decision loop needs from a venue goes through
//! [`ExchangeClient`]. Implementations: the paper exchange in
//! `xarb-executor`, scripted exchanges in tests, and any signed live client
//! plugged in by the operator.

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::{InstrumentTag, MarketQuote, OrderHandle, OrderRequest, OrderStatusReport};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Errors surfaced by an exchange client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Network failure or 5xx. Safe to retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Exchange throttled the request. Safe to retry after backoff.
    #[error("rate limited")]
    RateLimited,

    /// Order rejected outright (margin, reduce-only, bad size...).
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Handle unknown to the exchange.
    #[error("unknown order: {0}")]
    UnknownOrder(String),

    /// No book for the instrument.
    #[error("no market data for {0}")]
    NoMarketData(String),
}

impl ExchangeError {
    /// Whether a retry within the same cycle may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited | Self::NoMarketData(_)
        )
    }
}

/// Result alias for exchange calls.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Venue operations consumed by the decision loop.
pub trait ExchangeClient: Send + Sync {
    /// Current top of book for `instrument`.
    fn get_quote<'a>(&'a self, instrument: &'a InstrumentTag) -> BoxFuture<'a, ExchangeResult<MarketQuote>>;

    /// Submit an order. Returns once the exchange has acknowledged it.
    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>>;

    /// Current state and cumulative fill of an order.
    fn order_status<'a>(&'a self, handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<OrderStatusReport>>;

    /// Cancel a resting order. Cancelling a terminal order is not an error.
    fn cancel_order<'a>(&'a self, handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<()>>;
}

/// Shared, dynamically dispatched exchange client.
pub type DynExchangeClient = Arc<dyn ExchangeClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExchangeError::Transport("reset".into()).is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
        assert!(!ExchangeError::Rejected("margin".into()).is_retryable());
        assert!(!ExchangeError::UnknownOrder("1".into()).is_retryable());
    }
}
