//! Order-related types and identifiers.
//!
//! Provides order side, type, client order ID and the request/handle/status
//! types exchanged with an [`ExchangeClient`](crate::ExchangeClient).

use crate::{InstrumentTag, Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Marketable order. On HIP-3 venues this is sent as an IOC limit with a
    /// slippage-bounded price.
    Market,
    /// Resting passive limit order.
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Client order ID.
///
/// Every order, unwinds included, gets a fresh cloid so each leg can be
/// reconstructed from the logs. Placement retries reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `xarb_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("xarb_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Order instruction sent to the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub cloid: ClientOrderId,
    pub instrument: InstrumentTag,
    pub side: OrderSide,
    pub size: Size,
    pub order_type: OrderType,
    /// Limit price. Required for `Limit`, optional slippage bound for `Market`.
    pub price: Option<Price>,
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(instrument: InstrumentTag, side: OrderSide, size: Size) -> Self {
        Self {
            cloid: ClientOrderId::new(),
            instrument,
            side,
            size,
            order_type: OrderType::Market,
            price: None,
            reduce_only: false,
        }
    }

    pub fn limit(instrument: InstrumentTag, side: OrderSide, size: Size, price: Price) -> Self {
        Self {
            cloid: ClientOrderId::new(),
            instrument,
            side,
            size,
            order_type: OrderType::Limit,
            price: Some(price),
            reduce_only: false,
        }
    }

    #[must_use]
    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }
}

/// Exchange acknowledgment of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    pub cloid: ClientOrderId,
    /// Exchange-assigned order id.
    pub exchange_id: String,
}

/// Lifecycle state reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Resting or in flight. May be partially filled.
    Pending,
    Filled,
    /// Cancelled by us or by the exchange (IOC remainder). May carry a
    /// partial fill.
    Cancelled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled)
    }
}

/// Answer to an order status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub state: OrderState,
    pub filled_size: Size,
    pub avg_fill_price: Option<Price>,
}

impl OrderStatusReport {
    pub fn pending() -> Self {
        Self {
            state: OrderState::Pending,
            filled_size: Size::ZERO,
            avg_fill_price: None,
        }
    }

    pub fn filled(size: Size, price: Price) -> Self {
        Self {
            state: OrderState::Filled,
            filled_size: size,
            avg_fill_price: Some(price),
        }
    }

    pub fn cancelled(filled_size: Size, avg_fill_price: Option<Price>) -> Self {
        Self {
            state: OrderState::Cancelled,
            filled_size,
            avg_fill_price,
        }
    }
}

/// Whether a fill added or removed liquidity. Determines the fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillKind {
    Maker,
    Taker,
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maker => write!(f, "maker"),
            Self::Taker => write!(f, "taker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_client_order_id_unique() {
        let id1 = ClientOrderId::new();
        let id2 = ClientOrderId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("xarb_"));
    }

    #[test]
    fn test_order_request_builders() {
        let tag = InstrumentTag::new("flx:TSLA");
        let m = OrderRequest::market(tag.clone(), OrderSide::Buy, Size::new(dec!(0.25)));
        assert_eq!(m.order_type, OrderType::Market);
        assert!(m.price.is_none());

        let l = OrderRequest::limit(tag, OrderSide::Sell, Size::new(dec!(0.25)), Price::new(dec!(401)))
            .with_reduce_only(true);
        assert_eq!(l.order_type, OrderType::Limit);
        assert_eq!(l.price, Some(Price::new(dec!(401))));
        assert!(l.reduce_only);
        assert_ne!(m.cloid, l.cloid);
    }

    #[test]
    fn test_order_state_terminal() {
        assert!(!OrderState::Pending.is_terminal());
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }
}
