use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw ticker as returned by a venue. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub volume: Option<Decimal>,
}

/// A venue's view of a symbol at a point in time. Created per poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub exchange_id: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn from_ticker(exchange_id: impl Into<String>, ticker: Ticker) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            bid: ticker.bid,
            ask: ticker.ask,
            last: ticker.last,
            volume: ticker.volume,
            observed_at: Utc::now(),
        }
    }

    /// Both sides present and positive.
    pub fn is_two_sided(&self) -> bool {
        matches!((self.bid, self.ask), (Some(b), Some(a)) if b > Decimal::ZERO && a > Decimal::ZERO)
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best price to mark a position at: last trade, falling back to mid.
    pub fn mark_price(&self) -> Option<Decimal> {
        self.last.or_else(|| self.mid())
    }
}

/// Split `BASE/QUOTE` into its assets.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("BTC/USDT"), Some(("BTC", "USDT")));
        assert_eq!(split_symbol("BTCUSDT"), None);
        assert_eq!(split_symbol("/USDT"), None);
    }

    #[test]
    fn test_mark_price_falls_back_to_mid() {
        let ticker = Ticker {
            bid: Some(dec!(99)),
            ask: Some(dec!(101)),
            last: None,
            volume: None,
        };
        let quote = Quote::from_ticker("binance", ticker);
        assert_eq!(quote.mark_price(), Some(dec!(100)));
        assert!(quote.is_two_sided());
    }
}
