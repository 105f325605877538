//! Market data types shared by the detector, engine and executor.
//!
//! A `MarketQuote` is an immutable top-of-book snapshot for one leg. The two
//! legs of the pair are named `A` and `B`; a `Direction` says which leg is
//! bought and which is sold.

use crate::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange instrument identifier, e.g. `xyz:TSLA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentTag(String);

impl InstrumentTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote validity, modeled on the book state check done before any decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    /// Both sides positive and bid <= ask.
    Valid,
    /// A side is zero or negative.
    MissingSide,
    /// bid > ask.
    Crossed,
}

impl fmt::Display for QuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::MissingSide => write!(f, "MISSING_SIDE"),
            Self::Crossed => write!(f, "CROSSED"),
        }
    }
}

/// Immutable top-of-book snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub instrument: InstrumentTag,
    pub bid: Price,
    pub ask: Price,
    pub mid: Price,
    /// Exchange or local receive time, Unix epoch millis.
    pub timestamp_ms: u64,
}

impl MarketQuote {
    /// Build a quote; `mid` is derived from bid and ask.
    pub fn new(instrument: InstrumentTag, bid: Price, ask: Price, timestamp_ms: u64) -> Self {
        let mid = Price::new((bid.inner() + ask.inner()) / Decimal::TWO);
        Self {
            instrument,
            bid,
            ask,
            mid,
            timestamp_ms,
        }
    }

    pub fn state(&self) -> QuoteState {
        if !self.bid.is_positive() || !self.ask.is_positive() {
            QuoteState::MissingSide
        } else if self.bid > self.ask {
            QuoteState::Crossed
        } else {
            QuoteState::Valid
        }
    }

    /// Quote age relative to `now_ms`. Clock skew into the future counts as 0.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}

/// One of the two legs of the traded pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    A,
    B,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Trade direction across the pair.
///
/// `AToB` buys leg A at its ask and sells leg B at its bid, which pays when
/// B trades rich to A. `BToA` is the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::AToB, Direction::BToA];

    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::AToB => Self::BToA,
            Self::BToA => Self::AToB,
        }
    }

    /// Leg bought when entering this direction.
    pub fn buy_leg(&self) -> Leg {
        match self {
            Self::AToB => Leg::A,
            Self::BToA => Leg::B,
        }
    }

    /// Leg sold when entering this direction.
    pub fn sell_leg(&self) -> Leg {
        match self {
            Self::AToB => Leg::B,
            Self::BToA => Leg::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AToB => "A_TO_B",
            Self::BToA => "B_TO_A",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both legs' quotes from one polling tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePair {
    pub a: MarketQuote,
    pub b: MarketQuote,
}

impl QuotePair {
    pub fn new(a: MarketQuote, b: MarketQuote) -> Self {
        Self { a, b }
    }

    pub fn leg(&self, leg: Leg) -> &MarketQuote {
        match leg {
            Leg::A => &self.a,
            Leg::B => &self.b,
        }
    }

    /// Mean of the two mids; the reference price for fee estimates.
    pub fn avg_mid(&self) -> Price {
        Price::new((self.a.mid.inner() + self.b.mid.inner()) / Decimal::TWO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: Decimal, ask: Decimal) -> MarketQuote {
        MarketQuote::new(
            InstrumentTag::new("xyz:TSLA"),
            Price::new(bid),
            Price::new(ask),
            1_000,
        )
    }

    #[test]
    fn test_quote_mid() {
        let q = quote(dec!(400.00), dec!(400.10));
        assert_eq!(q.mid.inner(), dec!(400.05));
    }

    #[test]
    fn test_quote_state() {
        assert_eq!(quote(dec!(400), dec!(401)).state(), QuoteState::Valid);
        // locked book is still tradeable
        assert_eq!(quote(dec!(400), dec!(400)).state(), QuoteState::Valid);
        assert_eq!(quote(dec!(401), dec!(400)).state(), QuoteState::Crossed);
        assert_eq!(quote(dec!(0), dec!(400)).state(), QuoteState::MissingSide);
    }

    #[test]
    fn test_quote_age() {
        let q = quote(dec!(400), dec!(401));
        assert_eq!(q.age_ms(3_500), 2_500);
        assert_eq!(q.age_ms(500), 0);
    }

    #[test]
    fn test_direction_legs() {
        assert_eq!(Direction::AToB.buy_leg(), Leg::A);
        assert_eq!(Direction::AToB.sell_leg(), Leg::B);
        assert_eq!(Direction::BToA.buy_leg(), Leg::B);
        assert_eq!(Direction::AToB.opposite(), Direction::BToA);
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&Direction::AToB).unwrap();
        assert_eq!(json, "\"A_TO_B\"");
    }
}
