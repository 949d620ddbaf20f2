use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::exchange::{CallGuard, ExchangeAdapter};
use crate::models::quote::Quote;

/// Polls every venue for a symbol at once. Venues that fail or time out are
/// left out of that round.
#[derive(Clone)]
pub struct QuoteFetcher {
    venues: Vec<Arc<dyn ExchangeAdapter>>,
    guard: CallGuard,
}

impl QuoteFetcher {
    pub fn new(venues: Vec<Arc<dyn ExchangeAdapter>>, guard: CallGuard) -> Self {
        Self { venues, guard }
    }

    pub fn venue(&self, id: &str) -> Option<Arc<dyn ExchangeAdapter>> {
        self.venues.iter().find(|v| v.id() == id).cloned()
    }

    pub async fn fetch_quotes(&self, symbol: &str) -> BTreeMap<String, Quote> {
        let requests = self.venues.iter().map(|venue| {
            let guard = self.guard.clone();
            async move {
                let result = guard.run(venue.fetch_ticker(symbol)).await;
                (venue.id().to_string(), result)
            }
        });

        let mut quotes = BTreeMap::new();
        for (id, result) in join_all(requests).await {
            match result {
                Ok(ticker) => {
                    quotes.insert(id.clone(), Quote::from_ticker(id, ticker));
                }
                Err(e) => debug!("Error fetching {symbol} from {id}: {e}"),
            }
        }
        quotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::paper::StaticMarket;
    use crate::models::quote::Ticker;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_venue_is_excluded() {
        let ticker = Ticker {
            bid: Some(dec!(99)),
            ask: Some(dec!(100)),
            last: None,
            volume: None,
        };
        let venues: Vec<Arc<dyn ExchangeAdapter>> = vec![
            Arc::new(StaticMarket::new("a").with_ticker("BTC/USDT", ticker.clone())),
            Arc::new(StaticMarket::new("b")),
        ];
        let fetcher = QuoteFetcher::new(venues, CallGuard::new(4, Duration::from_secs(1)));

        let quotes = fetcher.fetch_quotes("BTC/USDT").await;
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes["a"].ask, Some(dec!(100)));
        assert!(fetcher.venue("b").is_some());
    }
}
