//! Execution coordinator.
//!
//! Turns one [`Decision`] into orders on both legs, dispatched concurrently:
//!
//! - OPEN, ADD and reversal closes: marketable orders on both legs
//! - take-profit and timeout closes: passive limits for `maker_grace_ms`,
//!   then market orders for the residual
//!
//! When the legs fill unevenly the excess is unwound with an opposite market
//! order. If that unwind fails the hard stop is tripped and the incident
//! carries every attempted leg for manual reconciliation. The part both legs
//! did fill is still booked so the ledger keeps tracking it.
//!
//! [`ExecutionCoordinator::settle`] applies a report to the ledger and
//! returns the records to persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use xarb_core::{
    CloseReason, Direction, DynExchangeClient, ExecutionIncident, FillKind, IncidentKind,
    InstrumentTag, LegRecord, OrderSide, PositionId, Price, QuotePair, Size, TradeAction,
    TradeEvent,
};
use xarb_detector::{CloseMethod, ProfitCalculator};
use xarb_engine::Decision;
use xarb_position::{CloseRecord, Position, PositionError, PositionLedger, SizeUpdate};
use xarb_telemetry::Metrics;

use crate::config::ExecutionConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::legs::{LegFill, LegRunner};
use crate::risk::HardStopLatch;

/// Both legs filled for the same quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFill {
    /// Direction traded: the position direction for OPEN/ADD, its opposite
    /// for closes.
    pub direction: Direction,
    pub requested: Size,
    pub quantity: Size,
    pub buy_price: Price,
    pub sell_price: Price,
    /// `Maker` only when both legs filled passively.
    pub fill_kind: FillKind,
}

impl PairFill {
    /// Captured spread per unit.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.sell_price.inner() - self.buy_price.inner()
    }

    #[must_use]
    pub fn avg_price(&self) -> Price {
        Price::new((self.buy_price.inner() + self.sell_price.inner()) / Decimal::TWO)
    }

    /// Share of the requested quantity that filled.
    fn fill_ratio(&self) -> Decimal {
        if self.requested.is_zero() {
            return Decimal::ZERO;
        }
        self.quantity.inner() / self.requested.inner()
    }
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Filled(PairFill),
    /// One side filled alone and was unwound. Ledger unchanged.
    RolledBack { detail: String },
    /// Unwind failed: unhedged exposure, hard stop tripped. `matched` is
    /// the quantity both legs filled before the unwind.
    RollbackFailed {
        detail: String,
        matched: Option<PairFill>,
    },
    /// Nothing filled.
    NotFilled { detail: String },
}

impl ExecutionOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Filled(_) => "filled",
            Self::RolledBack { .. } => "rolled_back",
            Self::RollbackFailed { .. } => "rollback_failed",
            Self::NotFilled { .. } => "not_filled",
        }
    }
}

/// Result of executing one decision.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub decision: Decision,
    pub outcome: ExecutionOutcome,
    /// Every order attempted, unwinds included.
    pub legs: Vec<LegRecord>,
    /// An uneven fill was trimmed by an unwind.
    pub unwound: bool,
    pub latency_ms: u64,
}

/// Ledger effects of a settled report.
#[derive(Debug, Clone, Default)]
pub struct Settlement {
    pub trade_events: Vec<TradeEvent>,
    pub incident: Option<ExecutionIncident>,
    /// Position archived by this settlement.
    pub closed: Option<Position>,
}

#[derive(Debug, Clone, Copy)]
enum LegStyle {
    Taker,
    MakerThenTaker,
}

/// Executes decisions and settles them into the ledger.
pub struct ExecutionCoordinator {
    exchange: DynExchangeClient,
    config: ExecutionConfig,
    calculator: ProfitCalculator,
    hard_stop: Arc<HardStopLatch>,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(
        exchange: DynExchangeClient,
        config: ExecutionConfig,
        calculator: ProfitCalculator,
        hard_stop: Arc<HardStopLatch>,
    ) -> Self {
        Self {
            exchange,
            config,
            calculator,
            hard_stop,
        }
    }

    #[must_use]
    pub fn hard_stop(&self) -> &Arc<HardStopLatch> {
        &self.hard_stop
    }

    /// Execute `decision` at `quotes`. `position` is the target of ADD and
    /// CLOSE decisions. Always yields a report.
    pub async fn execute(
        &self,
        decision: &Decision,
        quotes: &QuotePair,
        position: Option<&Position>,
    ) -> ExecutionReport {
        let started = Instant::now();
        let avg = quotes.avg_mid();

        let plan = match decision {
            Decision::Open {
                direction, size, ..
            } => Ok((
                *direction,
                Size::from_notional(*size, avg, self.config.size_decimals),
                LegStyle::Taker,
                false,
            )),
            Decision::Add {
                direction,
                add_size,
                ..
            } => Ok((
                *direction,
                Size::from_notional(*add_size, avg, self.config.size_decimals),
                LegStyle::Taker,
                false,
            )),
            Decision::Close {
                position_id,
                reason,
                ..
            } => match position.filter(|p| &p.id == position_id) {
                Some(p) => {
                    let style = match reason {
                        CloseReason::Reversal => LegStyle::Taker,
                        CloseReason::TakeProfit | CloseReason::Timeout => LegStyle::MakerThenTaker,
                    };
                    Ok((p.direction.opposite(), p.quantity, style, true))
                }
                None => Err(format!("position {position_id} not found")),
            },
        };

        let (outcome, legs, unwound) = match plan {
            Ok((_, quantity, _, _)) if !quantity.is_positive() => (
                ExecutionOutcome::NotFilled {
                    detail: format!("quantity rounds to zero at avg price {avg}"),
                },
                Vec::new(),
                false,
            ),
            Ok((direction, quantity, style, closing)) => {
                self.run_pair(decision, direction, quotes, quantity, style, closing)
                    .await
            }
            Err(detail) => (ExecutionOutcome::NotFilled { detail }, Vec::new(), false),
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        Metrics::execution(decision.kind(), outcome.label(), latency_ms as f64);
        match &outcome {
            ExecutionOutcome::Filled(fill) => {
                if matches!(decision, Decision::Close { .. }) {
                    Metrics::close_fill(&fill.fill_kind.to_string());
                }
                info!(
                    kind = decision.kind(),
                    direction = %fill.direction,
                    quantity = %fill.quantity,
                    buy_price = %fill.buy_price,
                    sell_price = %fill.sell_price,
                    fill_kind = %fill.fill_kind,
                    latency_ms,
                    "Executor: pair filled"
                );
            }
            ExecutionOutcome::RolledBack { detail } => {
                warn!(kind = decision.kind(), detail, "Executor: partial fill rolled back");
            }
            ExecutionOutcome::RollbackFailed { detail, matched } => {
                error!(
                    kind = decision.kind(),
                    position_id = decision.position_id().map(|id| id.as_str()).unwrap_or("-"),
                    legs = ?legs.iter().map(|l| l.cloid.as_str()).collect::<Vec<_>>(),
                    matched = ?matched.as_ref().map(|f| f.quantity),
                    detail,
                    "Executor: partial fill rollback FAILED"
                );
            }
            ExecutionOutcome::NotFilled { detail } => {
                warn!(
                    kind = decision.kind(),
                    position_id = decision.position_id().map(|id| id.as_str()).unwrap_or("-"),
                    detail,
                    "Executor: not filled"
                );
            }
        }

        ExecutionReport {
            decision: decision.clone(),
            outcome,
            legs,
            unwound,
            latency_ms,
        }
    }

    async fn run_pair(
        &self,
        decision: &Decision,
        direction: Direction,
        quotes: &QuotePair,
        quantity: Size,
        style: LegStyle,
        closing: bool,
    ) -> (ExecutionOutcome, Vec<LegRecord>, bool) {
        let runner = LegRunner::new(self.exchange.as_ref(), &self.config);
        let buy_quote = quotes.leg(direction.buy_leg());
        let sell_quote = quotes.leg(direction.sell_leg());

        let (buy, sell) = match style {
            LegStyle::Taker => {
                tokio::join!(
                    runner.market(&buy_quote.instrument, OrderSide::Buy, quantity, closing),
                    runner.market(&sell_quote.instrument, OrderSide::Sell, quantity, closing),
                )
            }
            LegStyle::MakerThenTaker => {
                let buy_px = self.passive_price(buy_quote.bid, buy_quote.ask, OrderSide::Buy);
                let sell_px = self.passive_price(sell_quote.bid, sell_quote.ask, OrderSide::Sell);
                tokio::join!(
                    runner.maker_then_taker(&buy_quote.instrument, OrderSide::Buy, quantity, buy_px),
                    runner.maker_then_taker(
                        &sell_quote.instrument,
                        OrderSide::Sell,
                        quantity,
                        sell_px
                    ),
                )
            }
        };

        let mut legs: Vec<LegRecord> = buy.records.iter().chain(&sell.records).cloned().collect();
        let matched = buy.filled.min(sell.filled);
        let fill = matched.is_positive().then(|| PairFill {
            direction,
            requested: quantity,
            quantity: matched,
            buy_price: buy.avg_price.unwrap_or(buy_quote.ask),
            sell_price: sell.avg_price.unwrap_or(sell_quote.bid),
            fill_kind: if buy.passive && sell.passive {
                FillKind::Maker
            } else {
                FillKind::Taker
            },
        });

        // Unwind whatever one side filled beyond the other.
        let excess = if buy.filled > sell.filled {
            Some((&buy_quote.instrument, OrderSide::Sell, buy.filled.saturating_sub(matched)))
        } else if sell.filled > buy.filled {
            Some((&sell_quote.instrument, OrderSide::Buy, sell.filled.saturating_sub(matched)))
        } else {
            None
        };

        let mut unwound = false;
        if let Some((instrument, side, size)) = excess {
            let unwind = runner.market(instrument, side, size, !closing).await;
            let ok = unwind.filled >= size;
            legs.extend(unwind.records.iter().cloned());
            if !ok {
                let detail = unwind_failure_detail(decision, instrument, side, size, &unwind, &buy, &sell);
                self.hard_stop.trigger(&detail);
                return (
                    ExecutionOutcome::RollbackFailed {
                        detail,
                        matched: fill,
                    },
                    legs,
                    false,
                );
            }
            unwound = true;
        }

        match fill {
            Some(fill) => (ExecutionOutcome::Filled(fill), legs, unwound),
            None => {
                let detail = leg_errors(&buy, &sell);
                let outcome = if unwound {
                    ExecutionOutcome::RolledBack { detail }
                } else {
                    ExecutionOutcome::NotFilled { detail }
                };
                (outcome, legs, unwound)
            }
        }
    }

    /// Near touch improved by `limit_price_improvement`, kept passive.
    fn passive_price(&self, bid: Price, ask: Price, side: OrderSide) -> Price {
        let improvement = self.config.limit_price_improvement;
        match side {
            OrderSide::Buy => {
                let px = bid.shifted(improvement);
                if px < ask {
                    px
                } else {
                    bid
                }
            }
            OrderSide::Sell => {
                let px = ask.shifted(-improvement);
                if px > bid {
                    px
                } else {
                    ask
                }
            }
        }
    }

    /// Apply `report` to the ledger. A ledger rejection loses this decision
    /// only and leaves the ledger unchanged.
    pub fn settle(
        &self,
        report: &ExecutionReport,
        ledger: &mut PositionLedger,
        now_ms: u64,
    ) -> ExecutorResult<Settlement> {
        let timestamp = to_utc(now_ms);
        let mut settlement = Settlement::default();

        let fill = match &report.outcome {
            ExecutionOutcome::Filled(fill) => fill,
            ExecutionOutcome::RolledBack { detail } => {
                settlement.incident = Some(incident(
                    report,
                    IncidentKind::PartialFillRolledBack,
                    detail,
                    timestamp,
                ));
                return Ok(settlement);
            }
            ExecutionOutcome::RollbackFailed { detail, matched } => {
                settlement.incident = Some(incident(
                    report,
                    IncidentKind::PartialFillRollbackFailure,
                    detail,
                    timestamp,
                ));
                if let Some(fill) = matched {
                    if let Err(e) =
                        self.apply_fill(&report.decision, fill, ledger, timestamp, now_ms, &mut settlement)
                    {
                        error!(
                            decision = report.decision.kind(),
                            quantity = %fill.quantity,
                            error = %e,
                            "Settle: matched part of failed rollback not booked"
                        );
                    }
                }
                if let Decision::Close { position_id, .. } = &report.decision {
                    // Park what is left CLOSING so the engine stops acting on it.
                    if ledger.get(position_id).is_some_and(Position::is_open) {
                        if let Err(e) = ledger.mark_closing(position_id) {
                            warn!(position_id = %position_id, error = %e, "Settle: could not park position");
                        }
                    }
                }
                return Ok(settlement);
            }
            ExecutionOutcome::NotFilled { detail } => {
                if !report.legs.is_empty() {
                    settlement.incident = Some(incident(
                        report,
                        IncidentKind::RetryExhausted,
                        detail,
                        timestamp,
                    ));
                }
                return Ok(settlement);
            }
        };

        if report.unwound {
            settlement.incident = Some(incident(
                report,
                IncidentKind::PartialFillRolledBack,
                &format!(
                    "uneven fill trimmed to {} of {}",
                    fill.quantity, fill.requested
                ),
                timestamp,
            ));
        }

        self.apply_fill(&report.decision, fill, ledger, timestamp, now_ms, &mut settlement)?;
        Ok(settlement)
    }

    /// Book a matched pair fill for `decision`.
    fn apply_fill(
        &self,
        decision: &Decision,
        fill: &PairFill,
        ledger: &mut PositionLedger,
        timestamp: DateTime<Utc>,
        now_ms: u64,
        settlement: &mut Settlement,
    ) -> ExecutorResult<()> {
        let fees = self.calculator.fees();
        match decision {
            Decision::Open {
                direction, size, ..
            } => {
                let notional = *size * fill.fill_ratio();
                let entry_fee = fees.open_fee(fill.avg_price());
                let id = ledger.next_id(*direction, timestamp);
                let position = Position::open(
                    id.clone(),
                    *direction,
                    notional,
                    fill.quantity,
                    fill.spread(),
                    entry_fee,
                    now_ms,
                );
                ledger.add(position)?;
                info!(
                    position_id = %id,
                    direction = %direction,
                    size = %notional,
                    entry_spread = %fill.spread(),
                    "Settle: position opened"
                );
                settlement.trade_events.push(TradeEvent {
                    timestamp,
                    action: TradeAction::Open,
                    position_id: id,
                    direction: *direction,
                    size: notional,
                    entry_spread: fill.spread(),
                    close_spread: None,
                    fees_paid: entry_fee,
                    realized_pnl: None,
                    close_reason: None,
                    holding_secs: None,
                });
            }
            Decision::Add {
                position_id,
                add_size,
                ..
            } => {
                let position = find(ledger, position_id)?;
                let notional = *add_size * fill.fill_ratio();
                let fee = fees.open_fee(fill.avg_price());
                let update =
                    SizeUpdate::weighted(&position, notional, fill.quantity, fill.spread(), fee);
                let entry_spread = update.entry_spread;
                ledger.update_size(position_id, update)?;
                info!(
                    position_id = %position_id,
                    add_size = %notional,
                    entry_spread = %entry_spread,
                    "Settle: position increased"
                );
                settlement.trade_events.push(TradeEvent {
                    timestamp,
                    action: TradeAction::Add,
                    position_id: position_id.clone(),
                    direction: position.direction,
                    size: notional,
                    entry_spread,
                    close_spread: None,
                    fees_paid: fee,
                    realized_pnl: None,
                    close_reason: None,
                    holding_secs: None,
                });
            }
            Decision::Close {
                position_id,
                reason,
                ..
            } => {
                let position = find(ledger, position_id)?;
                let method = match reason {
                    CloseReason::Reversal => CloseMethod::Reversal,
                    CloseReason::TakeProfit | CloseReason::Timeout => {
                        CloseMethod::MakerThenTaker(fill.fill_kind)
                    }
                };
                let profit =
                    self.calculator
                        .close_profit_at(&position, fill.spread(), fill.avg_price(), method);

                if fill.quantity < position.quantity {
                    settlement
                        .trade_events
                        .push(self.settle_partial_close(ledger, &position, fill, *reason, &profit, timestamp, now_ms)?);
                    return Ok(());
                }

                ledger.mark_closing(position_id)?;
                let closed = ledger.mark_closed(
                    position_id,
                    profit.net_pnl,
                    CloseRecord {
                        reason: *reason,
                        close_spread: profit.close_spread,
                        close_fee: profit.close_fee,
                        closed_at_ms: now_ms,
                    },
                )?;
                Metrics::trade_pnl(reason.as_str(), decimal_f64(profit.net_pnl));
                info!(
                    position_id = %position_id,
                    reason = %reason,
                    close_spread = %profit.close_spread,
                    realized_pnl = %profit.net_pnl,
                    fill_kind = %fill.fill_kind,
                    "Settle: position closed"
                );
                settlement.trade_events.push(TradeEvent {
                    timestamp,
                    action: TradeAction::Close,
                    position_id: position_id.clone(),
                    direction: closed.direction,
                    size: closed.size,
                    entry_spread: closed.entry_spread,
                    close_spread: Some(profit.close_spread),
                    fees_paid: profit.close_fee,
                    realized_pnl: Some(profit.net_pnl),
                    close_reason: Some(*reason),
                    holding_secs: closed.holding_secs(),
                });
                settlement.closed = Some(closed);
            }
        }
        Ok(())
    }

    /// Shrink a position that only partly closed. It stays OPEN and is
    /// picked up again by the next tick's cascade.
    #[allow(clippy::too_many_arguments)]
    fn settle_partial_close(
        &self,
        ledger: &mut PositionLedger,
        position: &Position,
        fill: &PairFill,
        reason: CloseReason,
        profit: &xarb_detector::CloseProfit,
        timestamp: DateTime<Utc>,
        now_ms: u64,
    ) -> ExecutorResult<TradeEvent> {
        let residual = position.quantity.saturating_sub(fill.quantity);
        let closed_share = fill.quantity.inner() / position.quantity.inner();
        let closed_notional = position.size * closed_share;
        ledger.update_size(
            &position.id,
            SizeUpdate {
                size: position.size - closed_notional,
                quantity: residual,
                entry_spread: position.entry_spread,
                entry_fee: position.entry_fee,
            },
        )?;
        Metrics::trade_pnl(reason.as_str(), decimal_f64(profit.net_pnl));
        warn!(
            position_id = %position.id,
            closed = %fill.quantity,
            residual = %residual,
            "Settle: partial close, residual stays open"
        );
        Ok(TradeEvent {
            timestamp,
            action: TradeAction::Close,
            position_id: position.id.clone(),
            direction: position.direction,
            size: closed_notional,
            entry_spread: position.entry_spread,
            close_spread: Some(profit.close_spread),
            fees_paid: profit.close_fee,
            realized_pnl: Some(profit.net_pnl),
            close_reason: Some(reason),
            holding_secs: Some(position.age_ms(now_ms) / 1000),
        })
    }
}

fn find(ledger: &PositionLedger, id: &PositionId) -> ExecutorResult<Position> {
    ledger.get(id).cloned().ok_or_else(|| {
        ExecutorError::Ledger(PositionError::LedgerInvariantViolation {
            position_id: id.clone(),
            reason: "position no longer active".to_string(),
        })
    })
}

fn incident(
    report: &ExecutionReport,
    kind: IncidentKind,
    detail: &str,
    timestamp: DateTime<Utc>,
) -> ExecutionIncident {
    ExecutionIncident {
        timestamp,
        kind,
        decision: report.decision.kind().to_string(),
        position_id: report.decision.position_id().cloned(),
        direction: report.decision.direction(),
        legs: report.legs.clone(),
        detail: detail.to_string(),
    }
}

fn leg_errors(buy: &LegFill, sell: &LegFill) -> String {
    format!(
        "buy: {}; sell: {}",
        buy.error().unwrap_or("no fill"),
        sell.error().unwrap_or("no fill")
    )
}

fn unwind_failure_detail(
    decision: &Decision,
    instrument: &InstrumentTag,
    side: OrderSide,
    size: Size,
    unwind: &LegFill,
    buy: &LegFill,
    sell: &LegFill,
) -> String {
    format!(
        "{} unwind {side} {size} {instrument} filled {}: {}; legs: {}",
        decision.kind(),
        unwind.filled,
        unwind.error().unwrap_or("no fill"),
        leg_errors(buy, sell)
    )
}

fn to_utc(now_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(now_ms as i64).unwrap_or_else(Utc::now)
}

fn decimal_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
