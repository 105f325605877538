//! Per-tick decision engine.
//!
//! Each tick the engine reads the ledger, the tick's quotes and the stable
//! opportunity (if any) and returns the decisions to execute, closes first.
//!
//! Close cascade per OPEN position, first match wins:
//! 1. Reversal: opposite-direction executable spread above threshold
//! 2. Take-profit: unrealized PnL strictly above target
//! 3. Timeout: holding time above limit, whatever the PnL
//!
//! There is no stop-loss. Adverse moves are met with ADD on same-direction
//! widening, bounded only by the ledger caps.

use rust_decimal::Decimal;
use tracing::{debug, info};

use xarb_core::{CloseReason, QuotePair};
use xarb_detector::{CloseMethod, DetectorConfig, ProfitCalculator, StableOpportunity};
use xarb_position::{Position, PositionLedger, TimeStop};
use xarb_telemetry::Metrics;

use crate::config::StrategyConfig;
use crate::decision::{CloseCheck, Decision};
use crate::error::EngineResult;

/// Inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Tick<'a> {
    pub quotes: &'a QuotePair,
    pub opportunity: Option<&'a StableOpportunity>,
    pub now_ms: u64,
    /// False while the hard stop is latched: closes only.
    pub allow_new_exposure: bool,
}

/// Decision engine over the ledger and the calculator.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: StrategyConfig,
    calculator: ProfitCalculator,
    min_net_profit: Decimal,
    time_stop: TimeStop,
}

impl DecisionEngine {
    #[must_use]
    pub fn new(config: StrategyConfig, detector: &DetectorConfig) -> Self {
        let time_stop = TimeStop::from_hours(config.position_timeout_hours);
        Self {
            config,
            calculator: detector.calculator(),
            min_net_profit: detector.min_net_profit,
            time_stop,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    #[must_use]
    pub fn calculator(&self) -> &ProfitCalculator {
        &self.calculator
    }

    /// Decisions for this tick. Fails without deciding anything when the
    /// quotes are invalid.
    pub fn evaluate(&self, ledger: &PositionLedger, tick: Tick<'_>) -> EngineResult<Vec<Decision>> {
        self.calculator.validate(tick.quotes, tick.now_ms)?;

        let mut decisions = Vec::new();

        for position in ledger.active_positions().iter().filter(|p| p.is_open()) {
            if let CloseCheck::Close {
                reason,
                close_spread,
                expected_pnl,
            } = self.evaluate_close(position, tick.quotes, tick.now_ms)?
            {
                decisions.push(Decision::Close {
                    position_id: position.id.clone(),
                    direction: position.direction,
                    reason,
                    close_spread,
                    expected_pnl,
                });
            }
        }

        if tick.allow_new_exposure {
            if let Some(opportunity) = tick.opportunity {
                if let Some(entry) = self.evaluate_entry(ledger, opportunity, &decisions) {
                    decisions.push(entry);
                }
            }
        } else if tick.opportunity.is_some() {
            debug!("Engine: new exposure halted, opportunity ignored");
        }

        for decision in &decisions {
            Metrics::decision(decision.kind());
            info!(
                kind = decision.kind(),
                direction = %decision.direction(),
                position_id = decision.position_id().map(|id| id.as_str()).unwrap_or("-"),
                "Engine: decision"
            );
        }

        Ok(decisions)
    }

    /// Close cascade for one position.
    pub fn evaluate_close(
        &self,
        position: &Position,
        quotes: &QuotePair,
        now_ms: u64,
    ) -> EngineResult<CloseCheck> {
        let reversal_spread = self
            .calculator
            .executable_spread(quotes, position.direction.opposite());
        if reversal_spread > self.config.reversal_min_spread {
            let profit = self.calculator.close_profit_at(
                position,
                reversal_spread,
                quotes.avg_mid(),
                CloseMethod::Reversal,
            );
            return Ok(CloseCheck::Close {
                reason: CloseReason::Reversal,
                close_spread: reversal_spread,
                expected_pnl: profit.net_pnl,
            });
        }

        let unrealized_pnl = self.calculator.unrealized_pnl(position, quotes, now_ms)?;
        if unrealized_pnl > self.config.take_profit_target {
            return Ok(CloseCheck::Close {
                reason: CloseReason::TakeProfit,
                close_spread: reversal_spread,
                expected_pnl: unrealized_pnl,
            });
        }

        if let Some(elapsed_ms) = self
            .time_stop
            .check_single(position.entry_timestamp_ms, now_ms)
        {
            debug!(
                position_id = %position.id,
                elapsed_ms,
                %unrealized_pnl,
                "Engine: position timed out"
            );
            return Ok(CloseCheck::Close {
                reason: CloseReason::Timeout,
                close_spread: reversal_spread,
                expected_pnl: unrealized_pnl,
            });
        }

        Ok(CloseCheck::Hold { unrealized_pnl })
    }

    fn evaluate_entry(
        &self,
        ledger: &PositionLedger,
        opportunity: &StableOpportunity,
        closing: &[Decision],
    ) -> Option<Decision> {
        match ledger.net_direction() {
            None => {
                let size = self.config.initial_position_size;
                if opportunity.net_profit <= self.min_net_profit {
                    return None;
                }
                if !ledger.can_open(size) {
                    debug!(%size, "Engine: OPEN blocked by ledger limits");
                    return None;
                }
                Some(Decision::Open {
                    direction: opportunity.direction,
                    size,
                    opportunity: opportunity.clone(),
                })
            }
            Some(net) if net == opportunity.direction => {
                let target = ledger.active_positions().iter().rev().find(|p| {
                    p.is_open()
                        && p.direction == opportunity.direction
                        && !closing.iter().any(|d| d.position_id() == Some(&p.id))
                })?;
                let increase = opportunity.executable_spread - target.entry_spread;
                if increase <= self.config.add_spread_increase
                    || opportunity.executable_spread < self.config.add_min_spread
                {
                    return None;
                }
                let add_size = self.config.add_position_size;
                if !ledger.can_add(&target.id, add_size) {
                    debug!(
                        position_id = %target.id,
                        %add_size,
                        "Engine: ADD blocked by ledger limits"
                    );
                    return None;
                }
                Some(Decision::Add {
                    position_id: target.id.clone(),
                    direction: opportunity.direction,
                    add_size,
                    opportunity: opportunity.clone(),
                })
            }
            // Opposite direction: handled as a reversal close, never a new open.
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;
    use xarb_core::{Direction, InstrumentTag, MarketQuote, PositionId, Price, Size};
    use xarb_detector::FeeSchedule;
    use xarb_position::{CloseRecord, LedgerLimits, SizeUpdate};

    const HOUR_MS: u64 = 3_600_000;

    fn zero_fee_detector() -> DetectorConfig {
        DetectorConfig {
            min_net_profit: dec!(0.15),
            stability_samples: 2,
            max_quote_age_ms: 5_000,
            fees: FeeSchedule {
                taker_fee_rate: Decimal::ZERO,
                maker_fee_rate: Decimal::ZERO,
                slippage_bps: Decimal::ZERO,
            },
        }
    }

    fn engine(strategy: StrategyConfig) -> DecisionEngine {
        DecisionEngine::new(strategy, &zero_fee_detector())
    }

    /// Locked books: A at `a`, B at `b`. AToB spread = b - a.
    fn quotes(a: Decimal, b: Decimal, ts: u64) -> QuotePair {
        QuotePair::new(
            MarketQuote::new(InstrumentTag::new("flx:TSLA"), Price::new(a), Price::new(a), ts),
            MarketQuote::new(InstrumentTag::new("xyz:TSLA"), Price::new(b), Price::new(b), ts),
        )
    }

    fn opportunity(direction: Direction, spread: Decimal, q: &QuotePair) -> StableOpportunity {
        StableOpportunity {
            direction,
            executable_spread: spread,
            net_profit: spread,
            open_fee: Decimal::ZERO,
            avg_price: q.avg_mid(),
            samples: 2,
            quotes: q.clone(),
            observed_at_ms: q.a.timestamp_ms,
        }
    }

    fn position(id: &str, direction: Direction, entry_spread: Decimal, entry_ms: u64) -> Position {
        Position::open(
            PositionId::new(id),
            direction,
            dec!(100),
            Size::new(dec!(0.25)),
            entry_spread,
            Decimal::ZERO,
            entry_ms,
        )
    }

    fn ledger_with(positions: Vec<Position>) -> PositionLedger {
        let mut ledger = PositionLedger::new(LedgerLimits::default());
        for p in positions {
            ledger.add(p).unwrap();
        }
        ledger
    }

    fn tick<'a>(q: &'a QuotePair, opp: Option<&'a StableOpportunity>, now_ms: u64) -> Tick<'a> {
        Tick {
            quotes: q,
            opportunity: opp,
            now_ms,
            allow_new_exposure: true,
        }
    }

    #[test]
    fn test_reversal_beats_timeout() {
        let strategy = StrategyConfig {
            reversal_min_spread: dec!(0.20),
            ..StrategyConfig::default()
        };
        let e = engine(strategy);
        let now = 10 * HOUR_MS;
        // opened 4h ago; entry -0.15 + reversal 0.25 = unrealized 0.10
        let p = position("p1", Direction::AToB, dec!(-0.15), now - 4 * HOUR_MS);
        let q = quotes(dec!(400.25), dec!(400.00), now);

        match e.evaluate_close(&p, &q, now).unwrap() {
            CloseCheck::Close {
                reason,
                close_spread,
                expected_pnl,
            } => {
                assert_eq!(reason, CloseReason::Reversal);
                assert_eq!(close_spread, dec!(0.25));
                assert_eq!(expected_pnl, dec!(0.10));
            }
            other => panic!("expected reversal, got {other:?}"),
        }

        // same position without a qualifying reversal falls through to timeout
        let strict = engine(StrategyConfig {
            reversal_min_spread: dec!(0.30),
            ..StrategyConfig::default()
        });
        assert!(matches!(
            strict.evaluate_close(&p, &q, now).unwrap(),
            CloseCheck::Close {
                reason: CloseReason::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_take_profit_boundary_is_strict() {
        let e = engine(StrategyConfig {
            reversal_min_spread: dec!(0.20),
            take_profit_target: dec!(0.50),
            ..StrategyConfig::default()
        });
        let now = HOUR_MS;
        let p = position("p1", Direction::AToB, dec!(0.45), now - 60_000);

        // entry 0.45 + reversal 0.05 = 0.50: hold
        let at_target = quotes(dec!(400.05), dec!(400.00), now);
        assert_eq!(
            e.evaluate_close(&p, &at_target, now).unwrap(),
            CloseCheck::Hold {
                unrealized_pnl: dec!(0.50)
            }
        );

        // 0.51: take profit
        let above = quotes(dec!(400.06), dec!(400.00), now);
        assert!(matches!(
            e.evaluate_close(&p, &above, now).unwrap(),
            CloseCheck::Close {
                reason: CloseReason::TakeProfit,
                expected_pnl,
                ..
            } if expected_pnl == dec!(0.51)
        ));
    }

    #[test]
    fn test_take_profit_beats_timeout() {
        let e = engine(StrategyConfig::default());
        let now = 5 * HOUR_MS;
        let p = position("p1", Direction::AToB, dec!(0.45), 0);
        // reversal spread 0.05 < 0.15, unrealized 0.50 > 0.35
        let q = quotes(dec!(400.05), dec!(400.00), now);
        assert!(matches!(
            e.evaluate_close(&p, &q, now).unwrap(),
            CloseCheck::Close {
                reason: CloseReason::TakeProfit,
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_closes_losing_position() {
        let e = engine(StrategyConfig::default());
        let now = 2 * HOUR_MS;
        let p = position("p1", Direction::AToB, dec!(0.30), 0);
        // spread widened against us: reversal -0.70, unrealized -0.40
        let q = quotes(dec!(400.00), dec!(400.70), now);
        assert!(matches!(
            e.evaluate_close(&p, &q, now).unwrap(),
            CloseCheck::Close {
                reason: CloseReason::Timeout,
                expected_pnl,
                ..
            } if expected_pnl == dec!(-0.40)
        ));
    }

    #[test]
    fn test_add_on_widening() {
        let e = engine(StrategyConfig::default());
        let now = HOUR_MS;
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.45), now - 60_000)]);

        // 0.70 - 0.45 = 0.25 > 0.20 and 0.70 >= 0.60
        let q = quotes(dec!(400.00), dec!(400.70), now);
        let opp = opportunity(Direction::AToB, dec!(0.70), &q);
        let decisions = e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap();
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::Add {
                position_id,
                add_size,
                ..
            } => {
                assert_eq!(position_id.as_str(), "p1");
                assert_eq!(*add_size, dec!(50));
            }
            other => panic!("expected ADD, got {other:?}"),
        }

        // 0.60 - 0.45 = 0.15: no action
        let q = quotes(dec!(400.00), dec!(400.60), now);
        let opp = opportunity(Direction::AToB, dec!(0.60), &q);
        assert!(e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap().is_empty());

        // increase of exactly the threshold is not enough
        let q = quotes(dec!(400.00), dec!(400.65), now);
        let opp = opportunity(Direction::AToB, dec!(0.65), &q);
        assert!(e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap().is_empty());
    }

    #[test]
    fn test_add_requires_min_spread() {
        let e = engine(StrategyConfig::default());
        let now = HOUR_MS;
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.20), now)]);
        // increase 0.35 but total 0.55 < 0.60
        let q = quotes(dec!(400.00), dec!(400.55), now);
        let opp = opportunity(Direction::AToB, dec!(0.55), &q);
        assert!(e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap().is_empty());
    }

    #[test]
    fn test_open_when_flat() {
        let e = engine(StrategyConfig::default());
        let ledger = ledger_with(vec![]);
        let q = quotes(dec!(400.00), dec!(400.30), 1_000);
        let opp = opportunity(Direction::AToB, dec!(0.30), &q);

        let decisions = e.evaluate(&ledger, tick(&q, Some(&opp), 1_000)).unwrap();
        assert!(matches!(
            decisions.as_slice(),
            [Decision::Open { direction: Direction::AToB, size, .. }] if *size == dec!(100)
        ));

        // no stable opportunity: nothing to do
        assert!(e.evaluate(&ledger, tick(&q, None, 1_000)).unwrap().is_empty());
    }

    #[test]
    fn test_open_requires_net_profit_above_minimum() {
        let e = engine(StrategyConfig::default());
        let ledger = ledger_with(vec![]);
        let q = quotes(dec!(400.00), dec!(400.15), 1_000);
        let opp = opportunity(Direction::AToB, dec!(0.15), &q);
        assert!(e.evaluate(&ledger, tick(&q, Some(&opp), 1_000)).unwrap().is_empty());
    }

    #[test]
    fn test_hard_stop_blocks_new_exposure_but_not_closes() {
        let e = engine(StrategyConfig::default());
        let now = 3 * HOUR_MS;
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.45), 0)]);
        let q = quotes(dec!(400.00), dec!(400.70), now);
        let opp = opportunity(Direction::AToB, dec!(0.70), &q);

        let decisions = e
            .evaluate(
                &ledger,
                Tick {
                    quotes: &q,
                    opportunity: Some(&opp),
                    now_ms: now,
                    allow_new_exposure: false,
                },
            )
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert!(matches!(
            decisions[0],
            Decision::Close {
                reason: CloseReason::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_opposite_opportunity_never_opens() {
        let e = engine(StrategyConfig {
            reversal_min_spread: dec!(0.50),
            ..StrategyConfig::default()
        });
        let now = HOUR_MS;
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.10), now)]);
        // BToA opportunity at 0.30, below the reversal threshold
        let q = quotes(dec!(400.30), dec!(400.00), now);
        let opp = opportunity(Direction::BToA, dec!(0.30), &q);
        let decisions = e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap();
        // unrealized 0.10 + 0.30 = 0.40 > 0.35 -> take profit, but no open
        assert!(decisions.iter().all(|d| !d.adds_exposure()));
    }

    #[test]
    fn test_position_closing_this_tick_is_not_added_to() {
        let e = engine(StrategyConfig {
            take_profit_target: dec!(-10),
            ..StrategyConfig::default()
        });
        let now = HOUR_MS;
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.10), now)]);
        let q = quotes(dec!(400.00), dec!(400.70), now);
        let opp = opportunity(Direction::AToB, dec!(0.70), &q);
        let decisions = e.evaluate(&ledger, tick(&q, Some(&opp), now)).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].kind(), "close_take_profit");
    }

    #[test]
    fn test_invalid_quotes_decide_nothing() {
        let e = engine(StrategyConfig::default());
        let ledger = ledger_with(vec![position("p1", Direction::AToB, dec!(0.45), 0)]);
        let q = quotes(dec!(400.00), dec!(400.70), 0);
        // stale by far
        assert!(e.evaluate(&ledger, tick(&q, None, 10 * HOUR_MS)).is_err());
    }

    /// Apply a decision the way a clean fill would.
    fn apply(ledger: &mut PositionLedger, decision: &Decision, seq: &mut u32, now: u64) {
        match decision {
            Decision::Open {
                direction,
                size,
                opportunity,
            } => {
                *seq += 1;
                let _ = ledger.add(Position::open(
                    PositionId::new(format!("p{seq}")),
                    *direction,
                    *size,
                    Size::new(dec!(0.25)),
                    opportunity.executable_spread,
                    opportunity.open_fee,
                    now,
                ));
            }
            Decision::Add {
                position_id,
                add_size,
                opportunity,
                ..
            } => {
                let p = ledger.get(position_id).unwrap().clone();
                let update = SizeUpdate::weighted(
                    &p,
                    *add_size,
                    Size::new(dec!(0.1)),
                    opportunity.executable_spread,
                    opportunity.open_fee,
                );
                let _ = ledger.update_size(position_id, update);
            }
            Decision::Close {
                position_id,
                reason,
                close_spread,
                expected_pnl,
                ..
            } => {
                ledger.mark_closing(position_id).unwrap();
                ledger
                    .mark_closed(
                        position_id,
                        *expected_pnl,
                        CloseRecord {
                            reason: *reason,
                            close_spread: *close_spread,
                            close_fee: Decimal::ZERO,
                            closed_at_ms: now,
                        },
                    )
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_random_decision_sequences_respect_caps() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let limits = LedgerLimits {
            max_positions: 2,
            max_total_notional: dec!(200),
            max_single_position: dec!(150),
        };

        for _ in 0..100 {
            let strategy = StrategyConfig {
                initial_position_size: Decimal::from(rng.gen_range(20..=150u32)),
                add_position_size: Decimal::from(rng.gen_range(10..=120u32)),
                add_spread_increase: dec!(0.05),
                add_min_spread: dec!(0.10),
                ..StrategyConfig::default()
            };
            let e = engine(strategy);
            let mut ledger = PositionLedger::new(limits.clone());
            let mut seq = 0u32;

            for step in 0..300u64 {
                let now = step * 60_000;
                let spread = Decimal::new(rng.gen_range(-120..=120), 2);
                let q = quotes(dec!(400.00), dec!(400.00) + spread, now);
                let opp = if spread.abs() > dec!(0.15) {
                    let direction = if spread > Decimal::ZERO {
                        Direction::AToB
                    } else {
                        Direction::BToA
                    };
                    Some(opportunity(direction, spread.abs(), &q))
                } else {
                    None
                };

                let decisions = e.evaluate(&ledger, tick(&q, opp.as_ref(), now)).unwrap();
                for d in &decisions {
                    apply(&mut ledger, d, &mut seq, now);
                    assert!(ledger.active_count() <= limits.max_positions);
                    assert!(ledger.aggregate_exposure() <= limits.max_total_notional);
                    assert!(ledger
                        .active_positions()
                        .iter()
                        .all(|p| p.size > Decimal::ZERO && p.size <= limits.max_single_position));
                }
            }
        }
    }
}
