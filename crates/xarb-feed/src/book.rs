//! `l2Book` response parsing.
//!
//! `levels[0]` holds bids and `levels[1]` asks, best first. An empty side
//! becomes a zero price so the quote reads as missing a side downstream.

use serde::Deserialize;

use xarb_core::{InstrumentTag, MarketQuote, Price};

use crate::error::{FeedError, FeedResult};

/// Raw `{"type": "l2Book"}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct L2BookResponse {
    pub coin: String,
    /// Exchange timestamp (ms).
    #[serde(default)]
    pub time: Option<u64>,
    pub levels: Vec<Vec<L2Level>>,
}

/// One aggregated price level.
#[derive(Debug, Clone, Deserialize)]
pub struct L2Level {
    pub px: String,
    pub sz: String,
    #[serde(default)]
    pub n: Option<u32>,
}

impl L2BookResponse {
    /// Best bid and ask. The quote carries the exchange `time` so staleness
    /// is judged on when the book was cut; `received_at_ms` stands in when
    /// the response has no timestamp.
    pub fn top_of_book(
        &self,
        instrument: &InstrumentTag,
        received_at_ms: u64,
    ) -> FeedResult<MarketQuote> {
        if self.levels.len() < 2 {
            return Err(FeedError::Parse {
                coin: self.coin.clone(),
                reason: format!("expected 2 book sides, got {}", self.levels.len()),
            });
        }
        let best = |side: &[L2Level]| -> FeedResult<Price> {
            match side.first() {
                Some(level) => Ok(Price::parse_positive(&level.px)?),
                None => Ok(Price::ZERO),
            }
        };
        let bid = best(&self.levels[0])?;
        let ask = best(&self.levels[1])?;
        let timestamp_ms = self.time.unwrap_or(received_at_ms);
        Ok(MarketQuote::new(instrument.clone(), bid, ask, timestamp_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use xarb_core::QuoteState;

    const BOOK: &str = r#"{
        "coin": "xyz:TSLA",
        "time": 1741944413123,
        "levels": [
            [{"px": "400.12", "sz": "3.5", "n": 2}, {"px": "400.10", "sz": "1.0", "n": 1}],
            [{"px": "400.20", "sz": "0.8", "n": 1}]
        ]
    }"#;

    #[test]
    fn test_top_of_book() {
        let book: L2BookResponse = serde_json::from_str(BOOK).unwrap();
        let quote = book.top_of_book(&InstrumentTag::new("xyz:TSLA"), 42).unwrap();
        assert_eq!(quote.bid, Price::new(dec!(400.12)));
        assert_eq!(quote.ask, Price::new(dec!(400.20)));
        assert_eq!(quote.mid, Price::new(dec!(400.16)));
        assert_eq!(quote.timestamp_ms, 1_741_944_413_123);
        assert_eq!(quote.state(), QuoteState::Valid);
    }

    #[test]
    fn test_hour_old_book_keeps_exchange_time() {
        let received_at_ms = 1_741_944_413_000;
        let book: L2BookResponse = serde_json::from_str(
            r#"{
                "coin": "xyz:TSLA",
                "time": 1741940813000,
                "levels": [[{"px": "400.10", "sz": "1"}], [{"px": "400.20", "sz": "1"}]]
            }"#,
        )
        .unwrap();
        let quote = book
            .top_of_book(&InstrumentTag::new("xyz:TSLA"), received_at_ms)
            .unwrap();
        assert_eq!(quote.timestamp_ms, 1_741_940_813_000);
        assert_eq!(quote.age_ms(received_at_ms), 3_600_000);
    }

    #[test]
    fn test_empty_side_reads_as_missing() {
        let book: L2BookResponse = serde_json::from_str(
            r#"{"coin": "flx:TSLA", "levels": [[], [{"px": "401.0", "sz": "1"}]]}"#,
        )
        .unwrap();
        let quote = book.top_of_book(&InstrumentTag::new("flx:TSLA"), 77).unwrap();
        assert_eq!(quote.state(), QuoteState::MissingSide);
        // no exchange time: receive time
        assert_eq!(quote.timestamp_ms, 77);
    }

    #[test]
    fn test_rejects_malformed_book() {
        let book: L2BookResponse =
            serde_json::from_str(r#"{"coin": "flx:TSLA", "levels": [[]]}"#).unwrap();
        assert!(matches!(
            book.top_of_book(&InstrumentTag::new("flx:TSLA"), 0),
            Err(FeedError::Parse { .. })
        ));

        let book: L2BookResponse = serde_json::from_str(
            r#"{"coin": "flx:TSLA", "levels": [[{"px": "-1", "sz": "1"}], []]}"#,
        )
        .unwrap();
        assert!(matches!(
            book.top_of_book(&InstrumentTag::new("flx:TSLA"), 0),
            Err(FeedError::Core(_))
        ));
    }
}
