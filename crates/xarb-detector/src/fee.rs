//! Fee-aware profit model for the pair.
//!
//! All amounts are per unit of the underlying in quote currency, the unit
//! the strategy thresholds are expressed in. Functions here are pure
//! arithmetic over quotes, the fee schedule and ledger positions.
//!
//! - Executable spread: sell-leg bid minus buy-leg ask, less modeled
//!   slippage on both legs.
//! - Open fee: one taker fill on each leg at the mean mid.
//! - Close value: entry spread plus the executable spread in the opposite
//!   direction, less entry and close fees.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use xarb_core::{Direction, FillKind, MarketQuote, Price, QuotePair, QuoteState};
use xarb_position::Position;

use crate::error::{DetectorError, DetectorResult, InvalidQuoteReason};

const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Fee rates as fractions of notional (0.00003 = 0.3 bps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: Decimal,
    #[serde(default = "default_maker_fee_rate")]
    pub maker_fee_rate: Decimal,
    /// Slippage allowance per leg, in basis points of the mean mid.
    #[serde(default)]
    pub slippage_bps: Decimal,
}

fn default_taker_fee_rate() -> Decimal {
    Decimal::new(3, 5) // 0.00003
}

fn default_maker_fee_rate() -> Decimal {
    Decimal::new(81, 6) // 0.000081
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_fee_rate: default_taker_fee_rate(),
            maker_fee_rate: default_maker_fee_rate(),
            slippage_bps: Decimal::ZERO,
        }
    }
}

impl FeeSchedule {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("taker_fee_rate", self.taker_fee_rate),
            ("maker_fee_rate", self.maker_fee_rate),
            ("slippage_bps", self.slippage_bps),
        ] {
            if value.is_sign_negative() {
                return Err(format!("{name} ({value}) must be non-negative"));
            }
        }
        if self.taker_fee_rate >= Decimal::ONE {
            return Err(format!(
                "taker_fee_rate ({}) must be a fraction below 1",
                self.taker_fee_rate
            ));
        }
        Ok(())
    }

    /// Fee for one fill on each leg at `avg_price`.
    #[must_use]
    pub fn pair_fee(&self, avg_price: Price, kind: FillKind) -> Decimal {
        let rate = match kind {
            FillKind::Maker => self.maker_fee_rate,
            FillKind::Taker => self.taker_fee_rate,
        };
        avg_price.inner() * rate * Decimal::TWO
    }

    /// Round-trip taker fee for opening a pair position.
    #[must_use]
    pub fn open_fee(&self, avg_price: Price) -> Decimal {
        self.pair_fee(avg_price, FillKind::Taker)
    }

    /// Slippage allowance over both legs.
    #[must_use]
    pub fn slippage_allowance(&self, avg_price: Price) -> Decimal {
        avg_price.inner() * self.slippage_bps / BPS_DIVISOR * Decimal::TWO
    }
}

/// Opening economics of one direction at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitEstimate {
    pub direction: Direction,
    /// Sell-leg mid minus buy-leg mid.
    pub raw_spread: Decimal,
    pub executable_spread: Decimal,
    pub open_fee: Decimal,
    pub net_profit: Decimal,
    pub avg_price: Price,
}

/// How a close is executed, which decides its fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseMethod {
    /// Offsetting taker trades in the opposite direction. Costs one open fee.
    Reversal,
    /// Passive first, taker on the residual. The caller says which happened.
    MakerThenTaker(FillKind),
}

/// Closing economics of a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseProfit {
    pub close_spread: Decimal,
    pub close_fee: Decimal,
    /// entry spread + close spread, before fees.
    pub gross_pnl: Decimal,
    /// gross - entry fee - close fee.
    pub net_pnl: Decimal,
}

/// Pure profit calculator over quotes and a fee schedule.
#[derive(Debug, Clone)]
pub struct ProfitCalculator {
    fees: FeeSchedule,
    max_quote_age_ms: u64,
}

impl ProfitCalculator {
    #[must_use]
    pub fn new(fees: FeeSchedule, max_quote_age_ms: u64) -> Self {
        Self {
            fees,
            max_quote_age_ms,
        }
    }

    #[must_use]
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Reject crossed, one-sided or stale quotes.
    pub fn validate(&self, quotes: &QuotePair, now_ms: u64) -> DetectorResult<()> {
        self.validate_quote(&quotes.a, now_ms)?;
        self.validate_quote(&quotes.b, now_ms)
    }

    fn validate_quote(&self, quote: &MarketQuote, now_ms: u64) -> DetectorResult<()> {
        let state = quote.state();
        if state != QuoteState::Valid {
            return Err(DetectorError::InvalidQuote {
                instrument: quote.instrument.clone(),
                reason: InvalidQuoteReason::Book(state),
            });
        }
        let age_ms = quote.age_ms(now_ms);
        if age_ms > self.max_quote_age_ms {
            return Err(DetectorError::InvalidQuote {
                instrument: quote.instrument.clone(),
                reason: InvalidQuoteReason::Stale {
                    age_ms,
                    max_age_ms: self.max_quote_age_ms,
                },
            });
        }
        Ok(())
    }

    /// Executable spread for entering `direction` at taker prices.
    #[must_use]
    pub fn executable_spread(&self, quotes: &QuotePair, direction: Direction) -> Decimal {
        let buy = quotes.leg(direction.buy_leg());
        let sell = quotes.leg(direction.sell_leg());
        sell.bid.inner() - buy.ask.inner() - self.fees.slippage_allowance(quotes.avg_mid())
    }

    /// Entry economics for `direction`.
    pub fn compute_net_profit(
        &self,
        quotes: &QuotePair,
        direction: Direction,
        now_ms: u64,
    ) -> DetectorResult<ProfitEstimate> {
        self.validate(quotes, now_ms)?;
        Ok(self.estimate(quotes, direction))
    }

    /// The direction with the larger net profit. Ties go to `AToB`.
    pub fn best_opportunity(&self, quotes: &QuotePair, now_ms: u64) -> DetectorResult<ProfitEstimate> {
        self.validate(quotes, now_ms)?;
        let a_to_b = self.estimate(quotes, Direction::AToB);
        let b_to_a = self.estimate(quotes, Direction::BToA);
        Ok(if b_to_a.net_profit > a_to_b.net_profit {
            b_to_a
        } else {
            a_to_b
        })
    }

    pub(crate) fn estimate(&self, quotes: &QuotePair, direction: Direction) -> ProfitEstimate {
        let avg_price = quotes.avg_mid();
        let buy = quotes.leg(direction.buy_leg());
        let sell = quotes.leg(direction.sell_leg());
        let executable_spread = self.executable_spread(quotes, direction);
        let open_fee = self.fees.open_fee(avg_price);
        ProfitEstimate {
            direction,
            raw_spread: sell.mid.inner() - buy.mid.inner(),
            executable_spread,
            open_fee,
            net_profit: executable_spread - open_fee,
            avg_price,
        }
    }

    /// Closing economics of `position` at the current quotes.
    pub fn compute_close_profit(
        &self,
        position: &Position,
        quotes: &QuotePair,
        method: CloseMethod,
        now_ms: u64,
    ) -> DetectorResult<CloseProfit> {
        self.validate(quotes, now_ms)?;
        let close_spread = self.executable_spread(quotes, position.direction.opposite());
        Ok(self.close_profit_at(position, close_spread, quotes.avg_mid(), method))
    }

    /// Conservative mark: taker close at the current quotes.
    pub fn unrealized_pnl(
        &self,
        position: &Position,
        quotes: &QuotePair,
        now_ms: u64,
    ) -> DetectorResult<Decimal> {
        self.compute_close_profit(position, quotes, CloseMethod::MakerThenTaker(FillKind::Taker), now_ms)
            .map(|p| p.net_pnl)
    }

    /// Closing economics for an already known close spread, e.g. one built
    /// from actual fill prices.
    #[must_use]
    pub fn close_profit_at(
        &self,
        position: &Position,
        close_spread: Decimal,
        avg_price: Price,
        method: CloseMethod,
    ) -> CloseProfit {
        let close_fee = match method {
            CloseMethod::Reversal => self.fees.open_fee(avg_price),
            CloseMethod::MakerThenTaker(kind) => self.fees.pair_fee(avg_price, kind),
        };
        let gross_pnl = position.entry_spread + close_spread;
        CloseProfit {
            close_spread,
            close_fee,
            gross_pnl,
            net_pnl: gross_pnl - position.entry_fee - close_fee,
        }
    }
}
