//! In-process exchange for paper trading and tests.
//!
//! Market orders fill immediately at the touch of the latest quote, up to the
//! configured top-of-book depth; the rest is cancelled IOC style. Limit
//! orders rest and fill at their limit price once the quote trades through
//! them. Quotes come from an optional upstream market-data client, polled
//! again while a limit rests, or are set directly. Scripted outcomes inject
//! exchange errors per instrument.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use xarb_core::{
    BoxFuture, DynExchangeClient, ExchangeClient, ExchangeError, ExchangeResult, InstrumentTag,
    MarketQuote, OrderHandle, OrderRequest, OrderSide, OrderState, OrderStatusReport, OrderType,
    Price, Size,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    status: OrderStatusReport,
}

/// Paper exchange.
pub struct PaperExchange {
    market: Option<DynExchangeClient>,
    quotes: Mutex<HashMap<InstrumentTag, MarketQuote>>,
    orders: Mutex<HashMap<String, PaperOrder>>,
    by_cloid: Mutex<HashMap<String, String>>,
    /// Every placement attempt, accepted or not.
    placed: Mutex<Vec<OrderRequest>>,
    /// Per-instrument queue of placement outcomes; `None` lets the order through.
    script: Mutex<HashMap<InstrumentTag, VecDeque<Option<ExchangeError>>>>,
    /// Size available at the touch per instrument; unlimited when absent.
    depth: Mutex<HashMap<InstrumentTag, Size>>,
    latency: Mutex<Option<Duration>>,
    /// Fill resting orders on the next status poll regardless of quotes.
    passive_fills: AtomicBool,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PaperExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperExchange")
            .field("upstream", &self.market.is_some())
            .field("orders", &self.orders.lock().len())
            .finish()
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperExchange {
    /// Paper exchange fed by `set_quote` only.
    pub fn new() -> Self {
        Self {
            market: None,
            quotes: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            by_cloid: Mutex::new(HashMap::new()),
            placed: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            depth: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            passive_fills: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Paper exchange that reads quotes from a live market-data client.
    pub fn with_market_data(market: DynExchangeClient) -> Self {
        Self {
            market: Some(market),
            ..Self::new()
        }
    }

    pub fn set_quote(&self, quote: MarketQuote) {
        self.quotes.lock().insert(quote.instrument.clone(), quote);
    }

    /// Queue placement outcomes for `instrument`, consumed in order.
    pub fn script_orders(
        &self,
        instrument: &InstrumentTag,
        outcomes: impl IntoIterator<Item = Option<ExchangeError>>,
    ) {
        self.script
            .lock()
            .entry(instrument.clone())
            .or_default()
            .extend(outcomes);
    }

    /// Cap what a marketable order on `instrument` can take at the touch.
    /// `None` removes the cap.
    pub fn set_depth(&self, instrument: &InstrumentTag, depth: Option<Size>) {
        let mut book = self.depth.lock();
        match depth {
            Some(size) => {
                book.insert(instrument.clone(), size);
            }
            None => {
                book.remove(instrument);
            }
        }
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn set_passive_fills(&self, enabled: bool) {
        self.passive_fills.store(enabled, Ordering::Release);
    }

    /// Placement attempts for verification.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }

    pub fn resting_count(&self) -> usize {
        self.orders
            .lock()
            .values()
            .filter(|o| o.status.state == OrderState::Pending)
            .count()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn quote(&self, instrument: &InstrumentTag) -> ExchangeResult<MarketQuote> {
        if let Some(market) = &self.market {
            let quote = market.get_quote(instrument).await?;
            self.set_quote(quote.clone());
            return Ok(quote);
        }
        self.quotes
            .lock()
            .get(instrument)
            .cloned()
            .ok_or_else(|| ExchangeError::NoMarketData(instrument.to_string()))
    }

    fn cached_quote(&self, instrument: &InstrumentTag) -> ExchangeResult<MarketQuote> {
        self.quotes
            .lock()
            .get(instrument)
            .cloned()
            .ok_or_else(|| ExchangeError::NoMarketData(instrument.to_string()))
    }

    /// Pull a fresh quote for a resting limit so it can trade through.
    async fn refresh_resting(&self, handle: &OrderHandle) {
        if self.market.is_none() {
            return;
        }
        let instrument = self
            .orders
            .lock()
            .get(&handle.exchange_id)
            .filter(|o| o.status.state == OrderState::Pending)
            .map(|o| o.request.instrument.clone());
        if let Some(instrument) = instrument {
            if let Err(e) = self.quote(&instrument).await {
                debug!(instrument = %instrument, error = %e, "Paper: quote refresh failed");
            }
        }
    }

    /// Marketable fill at `price`, cut to the touch depth.
    fn take(&self, request: &OrderRequest, price: Price) -> OrderStatusReport {
        let available = self.depth.lock().get(&request.instrument).copied();
        match available {
            Some(depth) if depth < request.size => {
                let price = depth.is_positive().then_some(price);
                OrderStatusReport::cancelled(depth, price)
            }
            _ => OrderStatusReport::filled(request.size, price),
        }
    }

    fn next_scripted(&self, instrument: &InstrumentTag) -> Option<ExchangeError> {
        self.script
            .lock()
            .get_mut(instrument)
            .and_then(VecDeque::pop_front)
            .flatten()
    }

    fn place(&self, request: OrderRequest) -> ExchangeResult<OrderHandle> {
        self.placed.lock().push(request.clone());

        if let Some(existing) = self.by_cloid.lock().get(request.cloid.as_str()) {
            return Ok(OrderHandle {
                cloid: request.cloid.clone(),
                exchange_id: existing.clone(),
            });
        }
        if let Some(err) = self.next_scripted(&request.instrument) {
            return Err(err);
        }
        if !request.size.is_positive() {
            return Err(ExchangeError::Rejected("size must be positive".to_string()));
        }

        let quote = self.cached_quote(&request.instrument)?;
        let status = match request.order_type {
            OrderType::Market => self.take(&request, touch(&quote, request.side)),
            OrderType::Limit => {
                let price = request
                    .price
                    .ok_or_else(|| ExchangeError::Rejected("limit order without price".to_string()))?;
                match crossed_fill(&quote, request.side, price) {
                    Some(px) => self.take(&request, px),
                    None => OrderStatusReport::pending(),
                }
            }
        };

        let exchange_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            cloid = %request.cloid,
            exchange_id,
            instrument = %request.instrument,
            side = %request.side,
            size = %request.size,
            state = ?status.state,
            "Paper: order accepted"
        );
        let handle = OrderHandle {
            cloid: request.cloid.clone(),
            exchange_id: exchange_id.clone(),
        };
        self.by_cloid
            .lock()
            .insert(request.cloid.as_str().to_string(), exchange_id.clone());
        self.orders.lock().insert(exchange_id, PaperOrder { request, status });
        Ok(handle)
    }

    fn status(&self, handle: &OrderHandle) -> ExchangeResult<OrderStatusReport> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&handle.exchange_id)
            .ok_or_else(|| ExchangeError::UnknownOrder(handle.exchange_id.clone()))?;

        if order.status.state == OrderState::Pending {
            if let Some(price) = order.request.price {
                let fill = if self.passive_fills.load(Ordering::Acquire) {
                    Some(price)
                } else {
                    self.quotes
                        .lock()
                        .get(&order.request.instrument)
                        .and_then(|q| trades_through(q, order.request.side, price))
                };
                if let Some(px) = fill {
                    order.status = OrderStatusReport::filled(order.request.size, px);
                }
            }
        }
        Ok(order.status.clone())
    }

    fn cancel(&self, handle: &OrderHandle) -> ExchangeResult<()> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&handle.exchange_id)
            .ok_or_else(|| ExchangeError::UnknownOrder(handle.exchange_id.clone()))?;
        if order.status.state == OrderState::Pending {
            order.status =
                OrderStatusReport::cancelled(order.status.filled_size, order.status.avg_fill_price);
        }
        Ok(())
    }
}

/// Price a market order takes.
fn touch(quote: &MarketQuote, side: OrderSide) -> Price {
    match side {
        OrderSide::Buy => quote.ask,
        OrderSide::Sell => quote.bid,
    }
}

/// Fill price of a marketable limit on arrival.
fn crossed_fill(quote: &MarketQuote, side: OrderSide, limit: Price) -> Option<Price> {
    match side {
        OrderSide::Buy if limit >= quote.ask => Some(quote.ask),
        OrderSide::Sell if limit <= quote.bid => Some(quote.bid),
        _ => None,
    }
}

/// Fill price of a resting limit once the book trades through it.
fn trades_through(quote: &MarketQuote, side: OrderSide, limit: Price) -> Option<Price> {
    match side {
        OrderSide::Buy if quote.ask <= limit => Some(limit),
        OrderSide::Sell if quote.bid >= limit => Some(limit),
        _ => None,
    }
}

impl ExchangeClient for PaperExchange {
    fn get_quote<'a>(
        &'a self,
        instrument: &'a InstrumentTag,
    ) -> BoxFuture<'a, ExchangeResult<MarketQuote>> {
        Box::pin(async move {
            self.delay().await;
            self.quote(instrument).await
        })
    }

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>> {
        Box::pin(async move {
            self.delay().await;
            self.place(request)
        })
    }

    fn order_status<'a>(
        &'a self,
        handle: &'a OrderHandle,
    ) -> BoxFuture<'a, ExchangeResult<OrderStatusReport>> {
        Box::pin(async move {
            self.delay().await;
            self.refresh_resting(handle).await;
            self.status(handle)
        })
    }

    fn cancel_order<'a>(&'a self, handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.delay().await;
            self.cancel(handle)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    fn tag() -> InstrumentTag {
        InstrumentTag::new("flx:TSLA")
    }

    fn exchange() -> PaperExchange {
        let ex = PaperExchange::new();
        ex.set_quote(MarketQuote::new(
            tag(),
            Price::new(dec!(399.90)),
            Price::new(dec!(400.10)),
            0,
        ));
        ex
    }

    #[test]
    fn test_market_order_fills_at_touch() {
        let ex = exchange();
        let handle = tokio_test::block_on(ex.place_order(OrderRequest::market(
            tag(),
            OrderSide::Buy,
            Size::new(dec!(0.25)),
        )))
        .unwrap();
        let report = tokio_test::block_on(ex.order_status(&handle)).unwrap();
        assert_eq!(report.state, OrderState::Filled);
        assert_eq!(report.avg_fill_price, Some(Price::new(dec!(400.10))));
    }

    #[tokio::test]
    async fn test_limit_rests_until_traded_through() {
        let ex = exchange();
        let handle = ex
            .place_order(OrderRequest::limit(
                tag(),
                OrderSide::Sell,
                Size::new(dec!(0.25)),
                Price::new(dec!(400.05)),
            ))
            .await
            .unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap().state, OrderState::Pending);
        assert_eq!(ex.resting_count(), 1);

        ex.set_quote(MarketQuote::new(
            tag(),
            Price::new(dec!(400.06)),
            Price::new(dec!(400.20)),
            1,
        ));
        let report = ex.order_status(&handle).await.unwrap();
        assert_eq!(report.state, OrderState::Filled);
        assert_eq!(report.avg_fill_price, Some(Price::new(dec!(400.05))));
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_state() {
        let ex = exchange();
        let handle = ex
            .place_order(OrderRequest::limit(
                tag(),
                OrderSide::Buy,
                Size::new(dec!(0.25)),
                Price::new(dec!(399.95)),
            ))
            .await
            .unwrap();
        ex.cancel_order(&handle).await.unwrap();
        let report = ex.order_status(&handle).await.unwrap();
        assert_eq!(report.state, OrderState::Cancelled);
        assert!(report.filled_size.is_zero());
    }

    #[tokio::test]
    async fn test_scripted_errors_consumed_in_order() {
        let ex = exchange();
        ex.script_orders(&tag(), [Some(ExchangeError::RateLimited), None]);
        let req = OrderRequest::market(tag(), OrderSide::Sell, Size::new(dec!(0.1)));
        assert_eq!(
            ex.place_order(req.clone()).await.unwrap_err(),
            ExchangeError::RateLimited
        );
        assert!(ex.place_order(req).await.is_ok());
        assert_eq!(ex.placed_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_cloid_is_idempotent() {
        let ex = exchange();
        let req = OrderRequest::market(tag(), OrderSide::Buy, Size::new(dec!(0.1)));
        let first = ex.place_order(req.clone()).await.unwrap();
        let second = ex.place_order(req).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_market_order_is_cut_to_depth() {
        let ex = exchange();
        ex.set_depth(&tag(), Some(Size::new(dec!(0.1))));
        let handle = ex
            .place_order(OrderRequest::market(tag(), OrderSide::Sell, Size::new(dec!(0.249))))
            .await
            .unwrap();
        let report = ex.order_status(&handle).await.unwrap();
        assert_eq!(report.state, OrderState::Cancelled);
        assert_eq!(report.filled_size, Size::new(dec!(0.1)));
        assert_eq!(report.avg_fill_price, Some(Price::new(dec!(399.90))));

        ex.set_depth(&tag(), None);
        let handle = ex
            .place_order(OrderRequest::market(tag(), OrderSide::Sell, Size::new(dec!(0.249))))
            .await
            .unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap().state, OrderState::Filled);
    }

    #[tokio::test]
    async fn test_resting_limit_sees_upstream_quotes() {
        let upstream = Arc::new(exchange());
        let market: DynExchangeClient = upstream.clone();
        let ex = PaperExchange::with_market_data(market);
        ex.get_quote(&tag()).await.unwrap();

        let handle = ex
            .place_order(OrderRequest::limit(
                tag(),
                OrderSide::Sell,
                Size::new(dec!(0.25)),
                Price::new(dec!(400.05)),
            ))
            .await
            .unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap().state, OrderState::Pending);

        // Only the upstream book moves.
        upstream.set_quote(MarketQuote::new(
            tag(),
            Price::new(dec!(400.06)),
            Price::new(dec!(400.20)),
            1,
        ));
        let report = ex.order_status(&handle).await.unwrap();
        assert_eq!(report.state, OrderState::Filled);
        assert_eq!(report.avg_fill_price, Some(Price::new(dec!(400.05))));
    }

    #[tokio::test]
    async fn test_missing_quote_is_retryable() {
        let ex = PaperExchange::new();
        let err = ex.get_quote(&tag()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
