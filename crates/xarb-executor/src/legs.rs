//! Single-leg order driving: placement with retry, fill polling and the
//! maker-then-taker close path.

use std::future::Future;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use xarb_core::{
    ExchangeClient, ExchangeResult, InstrumentTag, LegRecord, OrderHandle, OrderRequest, OrderSide,
    OrderState, OrderStatusReport, Price, Size,
};
use xarb_telemetry::Metrics;

use crate::config::ExecutionConfig;
use crate::error::{ExecutorError, ExecutorResult};

/// Everything that happened on one leg. A maker-then-taker leg carries two
/// order records.
#[derive(Debug, Clone)]
pub(crate) struct LegFill {
    pub records: Vec<LegRecord>,
    pub filled: Size,
    pub avg_price: Option<Price>,
    /// Filled entirely by a resting order.
    pub passive: bool,
}

impl LegFill {
    fn from_record(record: LegRecord, avg_price: Option<Price>, passive: bool) -> Self {
        Self {
            filled: record.filled,
            records: vec![record],
            avg_price,
            passive,
        }
    }

    /// Fold a taker fallback into a partially filled maker leg.
    fn merge(mut self, taker: LegFill) -> Self {
        self.avg_price = blend(
            (self.filled, self.avg_price),
            (taker.filled, taker.avg_price),
        );
        self.filled = self.filled + taker.filled;
        self.passive = false;
        self.records.extend(taker.records);
        self
    }

    pub fn error(&self) -> Option<&str> {
        self.records.iter().rev().find_map(|r| r.error.as_deref())
    }
}

/// Size-weighted average of two partial fills.
fn blend(a: (Size, Option<Price>), b: (Size, Option<Price>)) -> Option<Price> {
    let total = a.0 + b.0;
    if total.is_zero() {
        return a.1.or(b.1);
    }
    let value = |(size, price): (Size, Option<Price>)| price.map(|p| size.notional(p));
    match (value(a), value(b)) {
        (Some(va), Some(vb)) => Some(Price::new((va + vb) / total.inner())),
        (Some(_), None) => a.1,
        (None, Some(_)) => b.1,
        (None, None) => None,
    }
}

/// Drives orders for one leg against the exchange.
pub(crate) struct LegRunner<'a> {
    exchange: &'a dyn ExchangeClient,
    config: &'a ExecutionConfig,
}

impl<'a> LegRunner<'a> {
    pub fn new(exchange: &'a dyn ExchangeClient, config: &'a ExecutionConfig) -> Self {
        Self { exchange, config }
    }

    /// Bound one exchange call by `order_timeout_ms`.
    async fn call<T, F>(&self, instrument: &InstrumentTag, fut: F) -> ExecutorResult<T>
    where
        F: Future<Output = ExchangeResult<T>>,
    {
        match timeout(self.config.order_timeout(), fut).await {
            Ok(result) => result.map_err(ExecutorError::from),
            Err(_) => Err(ExecutorError::ExecutionTimeout {
                instrument: instrument.clone(),
                timeout_ms: self.config.order_timeout_ms,
            }),
        }
    }

    /// Place with bounded retry and exponential backoff. Retries reuse the
    /// client order id, so a placement that timed out after reaching the
    /// exchange is not duplicated.
    async fn submit(&self, request: &OrderRequest) -> ExecutorResult<OrderHandle> {
        let max_attempts = self.config.max_leg_retries.max(1);
        let mut attempt = 1;
        loop {
            match self
                .call(&request.instrument, self.exchange.place_order(request.clone()))
                .await
            {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        cloid = %request.cloid,
                        instrument = %request.instrument,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Leg: placement failed, retrying"
                    );
                    Metrics::order_retry(request.instrument.as_str());
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll until the order is terminal or `deadline` passes. Transient
    /// status errors keep polling.
    async fn poll_until(
        &self,
        instrument: &InstrumentTag,
        handle: &OrderHandle,
        deadline: Instant,
    ) -> ExecutorResult<OrderStatusReport> {
        let mut last = OrderStatusReport::pending();
        loop {
            match self.call(instrument, self.exchange.order_status(handle)).await {
                Ok(report) => {
                    if report.state.is_terminal() {
                        return Ok(report);
                    }
                    last = report;
                }
                Err(e) if e.is_retryable() => {
                    debug!(cloid = %handle.cloid, error = %e, "Leg: status poll failed");
                }
                Err(e) => return Err(e),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(last);
            }
            sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }

    /// Cancel and return the final fill state.
    async fn cancel_and_settle(
        &self,
        instrument: &InstrumentTag,
        handle: &OrderHandle,
    ) -> ExecutorResult<OrderStatusReport> {
        if let Err(e) = self.call(instrument, self.exchange.cancel_order(handle)).await {
            warn!(cloid = %handle.cloid, error = %e, "Leg: cancel failed");
        }
        self.call(instrument, self.exchange.order_status(handle)).await
    }

    /// Marketable order, filled or given up within the timeout.
    pub async fn market(
        &self,
        instrument: &InstrumentTag,
        side: OrderSide,
        size: Size,
        reduce_only: bool,
    ) -> LegFill {
        let request = OrderRequest::market(instrument.clone(), side, size).with_reduce_only(reduce_only);
        let mut record = new_record(&request);

        let handle = match self.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                record.error = Some(e.to_string());
                return LegFill::from_record(record, None, false);
            }
        };
        record.exchange_id = Some(handle.exchange_id.clone());

        let deadline = Instant::now() + self.config.order_timeout();
        let report = match self.poll_until(instrument, &handle, deadline).await {
            Ok(report) if report.state == OrderState::Pending => {
                record.error = Some("fill not confirmed within timeout".to_string());
                self.cancel_and_settle(instrument, &handle).await.unwrap_or(report)
            }
            Ok(report) => report,
            Err(e) => {
                record.error = Some(e.to_string());
                return LegFill::from_record(record, None, false);
            }
        };
        record.filled = report.filled_size;
        LegFill::from_record(record, report.avg_fill_price, false)
    }

    /// Passive limit at `limit_price` for the grace window, then a market
    /// order for whatever is left.
    pub async fn maker_then_taker(
        &self,
        instrument: &InstrumentTag,
        side: OrderSide,
        size: Size,
        limit_price: Price,
    ) -> LegFill {
        let request =
            OrderRequest::limit(instrument.clone(), side, size, limit_price).with_reduce_only(true);
        let mut record = new_record(&request);

        let handle = match self.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                record.error = Some(e.to_string());
                let maker = LegFill::from_record(record, None, false);
                return maker.merge(self.market(instrument, side, size, true).await);
            }
        };
        record.exchange_id = Some(handle.exchange_id.clone());

        let deadline = Instant::now() + self.config.maker_grace();
        let mut report = match self.poll_until(instrument, &handle, deadline).await {
            Ok(report) => report,
            Err(e) => {
                record.error = Some(e.to_string());
                OrderStatusReport::pending()
            }
        };
        if report.state != OrderState::Filled {
            report = match self.cancel_and_settle(instrument, &handle).await {
                Ok(settled) => settled,
                Err(e) => {
                    record.error = Some(e.to_string());
                    report
                }
            };
        }
        record.filled = report.filled_size;

        let residual = size.saturating_sub(report.filled_size);
        if residual.is_zero() {
            return LegFill::from_record(record, report.avg_fill_price, true);
        }

        debug!(
            instrument = %instrument,
            %residual,
            grace_ms = self.config.maker_grace_ms,
            "Leg: maker window elapsed, taking residual"
        );
        let maker = LegFill::from_record(record, report.avg_fill_price, false);
        maker.merge(self.market(instrument, side, residual, true).await)
    }
}

fn new_record(request: &OrderRequest) -> LegRecord {
    LegRecord {
        cloid: request.cloid.clone(),
        instrument: request.instrument.clone(),
        side: request.side,
        requested: request.size,
        filled: Size::ZERO,
        exchange_id: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_blend_weights_by_size() {
        let avg = blend(
            (Size::new(dec!(1)), Some(Price::new(dec!(100)))),
            (Size::new(dec!(3)), Some(Price::new(dec!(104)))),
        );
        assert_eq!(avg, Some(Price::new(dec!(103))));
    }

    #[test]
    fn test_blend_ignores_empty_side() {
        let avg = blend((Size::ZERO, None), (Size::new(dec!(2)), Some(Price::new(dec!(50)))));
        assert_eq!(avg, Some(Price::new(dec!(50))));
    }
}
