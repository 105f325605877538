//! HTTP client for the exchange info endpoint.
//!
//! Polls `{"type": "l2Book", "coin": ...}` for top-of-book quotes. The
//! client is read-only: it serves market data through [`ExchangeClient`]
//! and rejects every order call.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, trace};

use xarb_core::{
    BoxFuture, ExchangeClient, ExchangeError, ExchangeResult, InstrumentTag, MarketQuote,
    OrderHandle, OrderRequest, OrderStatusReport,
};

use crate::book::L2BookResponse;
use crate::error::{FeedError, FeedResult};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Public info endpoint.
pub const DEFAULT_INFO_URL: &str = "https://api.hyperliquid.xyz/info";

/// Request body for `l2Book`.
#[derive(Debug, Serialize)]
struct L2BookRequest<'a> {
    #[serde(rename = "type")]
    request_type: &'static str,
    coin: &'a str,
}

/// Client for quotes from the info endpoint.
#[derive(Debug, Clone)]
pub struct InfoClient {
    client: Client,
    info_url: String,
}

impl InfoClient {
    /// Create a new info client.
    ///
    /// # Arguments
    /// * `info_url` - URL of the info endpoint (e.g., "https://api.hyperliquid.xyz/info")
    pub fn new(info_url: impl Into<String>) -> FeedResult<Self> {
        Self::with_timeout(info_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(info_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            info_url: info_url.into(),
        })
    }

    #[must_use]
    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    /// Fetch the raw book for `coin`.
    pub async fn fetch_l2_book(&self, coin: &str) -> FeedResult<L2BookResponse> {
        let request = L2BookRequest {
            request_type: "l2Book",
            coin,
        };

        let response = self
            .client
            .post(&self.info_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::HttpClient(format!("Failed to read response: {e}")))?;
        if body.trim() == "null" {
            return Err(FeedError::Parse {
                coin: coin.to_string(),
                reason: "unknown coin".to_string(),
            });
        }
        trace!(coin, bytes = body.len(), "Raw l2Book response received");
        Ok(serde_json::from_str(&body)?)
    }

    /// Top-of-book quote for `instrument`, stamped with the exchange book
    /// time, or local receive time when the response carries none.
    pub async fn fetch_quote(&self, instrument: &InstrumentTag) -> FeedResult<MarketQuote> {
        let book = self.fetch_l2_book(instrument.as_str()).await?;
        let received_at_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let quote = book.top_of_book(instrument, received_at_ms)?;
        debug!(
            instrument = %instrument,
            bid = %quote.bid,
            ask = %quote.ask,
            exchange_time = ?book.time,
            "Quote fetched"
        );
        Ok(quote)
    }
}

fn read_only() -> ExchangeError {
    ExchangeError::Rejected("info endpoint is read-only".to_string())
}

impl ExchangeClient for InfoClient {
    fn get_quote<'a>(
        &'a self,
        instrument: &'a InstrumentTag,
    ) -> BoxFuture<'a, ExchangeResult<MarketQuote>> {
        Box::pin(async move { self.fetch_quote(instrument).await.map_err(ExchangeError::from) })
    }

    fn place_order(&self, _request: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>> {
        Box::pin(async { Err(read_only()) })
    }

    fn order_status<'a>(
        &'a self,
        _handle: &'a OrderHandle,
    ) -> BoxFuture<'a, ExchangeResult<OrderStatusReport>> {
        Box::pin(async { Err(read_only()) })
    }

    fn cancel_order<'a>(&'a self, _handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async { Err(read_only()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xarb_core::{OrderSide, Size};

    #[test]
    fn test_request_body() {
        let body = serde_json::to_string(&L2BookRequest {
            request_type: "l2Book",
            coin: "xyz:TSLA",
        })
        .unwrap();
        assert_eq!(body, r#"{"type":"l2Book","coin":"xyz:TSLA"}"#);
    }

    #[tokio::test]
    async fn test_orders_are_rejected() {
        let client = InfoClient::new(DEFAULT_INFO_URL).unwrap();
        let request = OrderRequest::market(InstrumentTag::new("xyz:TSLA"), OrderSide::Buy, Size::ZERO);
        let err = client.place_order(request).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_mapping() {
        let rate_limited: ExchangeError = FeedError::Status {
            status: 429,
            body: String::new(),
        }
        .into();
        assert_eq!(rate_limited, ExchangeError::RateLimited);

        let parse: ExchangeError = FeedError::Parse {
            coin: "flx:TSLA".into(),
            reason: "unknown coin".into(),
        }
        .into();
        assert!(parse.is_retryable());
    }
}
