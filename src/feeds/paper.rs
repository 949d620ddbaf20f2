use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::exchange::{ExchangeAdapter, ExchangeError, ExchangeResult};
use crate::models::candle::Candle;
use crate::models::order::{OrderAck, OrderSide, OrderType};
use crate::models::quote::{split_symbol, Ticker};

/// Dry-run venue: real market data from `inner`, simulated balances and fills.
pub struct PaperExchange {
    inner: Arc<dyn ExchangeAdapter>,
    balances: Mutex<HashMap<String, Decimal>>,
}

impl PaperExchange {
    pub fn new(inner: Arc<dyn ExchangeAdapter>, quote_asset: &str, starting_balance: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_asset.to_string(), starting_balance);
        Self {
            inner,
            balances: Mutex::new(balances),
        }
    }

    pub fn with_balance(mut self, asset: &str, amount: Decimal) -> Self {
        self.balances.get_mut().insert(asset.to_string(), amount);
        self
    }

    pub async fn balances(&self) -> HashMap<String, Decimal> {
        self.balances.lock().await.clone()
    }

    async fn fill(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let (base, quote) =
            split_symbol(symbol).ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "invalid order {amount} @ {price}"
            )));
        }

        let mut balances = self.balances.lock().await;
        let notional = amount * price;
        let (spend_asset, spend, receive_asset, receive) = match side {
            OrderSide::Buy => (quote, notional, base, amount),
            OrderSide::Sell => (base, amount, quote, notional),
        };

        let available = balances.get(spend_asset).copied().unwrap_or(Decimal::ZERO);
        if available < spend {
            return Err(ExchangeError::InsufficientBalance {
                asset: spend_asset.to_string(),
                needed: spend,
                available,
            });
        }
        balances.insert(spend_asset.to_string(), available - spend);
        *balances.entry(receive_asset.to_string()).or_insert(Decimal::ZERO) += receive;
        drop(balances);

        let order_id = format!("paper-{}", uuid::Uuid::new_v4());
        info!(
            "[PAPER] {} {} {} {} @ {} ({})",
            self.inner.id(),
            side.as_str(),
            amount,
            symbol,
            price,
            order_id
        );

        Ok(OrderAck {
            order_id,
            exchange_id: self.inner.id().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type,
            amount,
            price: Some(price),
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        self.inner.fetch_ticker(symbol).await
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        self.inner.fetch_candles(symbol, interval, limit).await
    }

    async fn fetch_free_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        Ok(self
            .balances
            .lock()
            .await
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    /// Buys fill at the ask, sells at the bid; last price when a side is missing.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let ticker = self.inner.fetch_ticker(symbol).await?;
        let touch = match side {
            OrderSide::Buy => ticker.ask,
            OrderSide::Sell => ticker.bid,
        };
        let price = touch
            .or(ticker.last)
            .ok_or_else(|| ExchangeError::Rejected(format!("no price for {symbol}")))?;
        self.fill(symbol, side, OrderType::Market, amount, price).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        self.fill(symbol, side, OrderType::Limit, amount, price).await
    }
}

/// Offline venue with fixed tickers and candles. Orders are refused; wrap it in
/// `PaperExchange` to trade against it.
pub struct StaticMarket {
    id: String,
    tickers: std::sync::RwLock<HashMap<String, Ticker>>,
    candles: std::sync::RwLock<HashMap<String, Vec<Candle>>>,
}

impl StaticMarket {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tickers: std::sync::RwLock::new(HashMap::new()),
            candles: std::sync::RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ticker(self, symbol: &str, ticker: Ticker) -> Self {
        self.set_ticker(symbol, ticker);
        self
    }

    pub fn with_candles(self, symbol: &str, candles: Vec<Candle>) -> Self {
        if let Ok(mut map) = self.candles.write() {
            map.insert(symbol.to_string(), candles);
        }
        self
    }

    pub fn set_ticker(&self, symbol: &str, ticker: Ticker) {
        if let Ok(mut map) = self.tickers.write() {
            map.insert(symbol.to_string(), ticker);
        }
    }
}

#[async_trait]
impl ExchangeAdapter for StaticMarket {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        self.tickers
            .read()
            .ok()
            .and_then(|m| m.get(symbol).cloned())
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let candles = self
            .candles
            .read()
            .ok()
            .and_then(|m| m.get(symbol).cloned())
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn fetch_free_balance(&self, _asset: &str) -> ExchangeResult<Decimal> {
        Ok(Decimal::ZERO)
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        _amount: Decimal,
    ) -> ExchangeResult<OrderAck> {
        Err(ExchangeError::Unsupported {
            venue: self.id.clone(),
            operation: "order placement",
        })
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        _amount: Decimal,
        _price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        Err(ExchangeError::Unsupported {
            venue: self.id.clone(),
            operation: "order placement",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> Arc<dyn ExchangeAdapter> {
        Arc::new(StaticMarket::new("sim").with_ticker(
            "BTC/USDT",
            Ticker {
                bid: Some(dec!(99)),
                ask: Some(dec!(100)),
                last: Some(dec!(99.5)),
                volume: None,
            },
        ))
    }

    #[tokio::test]
    async fn test_market_buy_fills_at_ask() {
        let paper = PaperExchange::new(market(), "USDT", dec!(1000));
        let ack = paper
            .place_market_order("BTC/USDT", OrderSide::Buy, dec!(2))
            .await
            .unwrap();
        assert_eq!(ack.price, Some(dec!(100)));
        assert_eq!(paper.fetch_free_balance("USDT").await.unwrap(), dec!(800));
        assert_eq!(paper.fetch_free_balance("BTC").await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_sell_without_inventory_is_rejected() {
        let paper = PaperExchange::new(market(), "USDT", dec!(1000));
        let err = paper
            .place_market_order("BTC/USDT", OrderSide::Sell, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_limit_sell_uses_given_price() {
        let paper = PaperExchange::new(market(), "USDT", dec!(0)).with_balance("BTC", dec!(1));
        let ack = paper
            .place_limit_order("BTC/USDT", OrderSide::Sell, dec!(0.5), dec!(105))
            .await
            .unwrap();
        assert!(ack.order_id.starts_with("paper-"));
        assert_eq!(paper.fetch_free_balance("USDT").await.unwrap(), dec!(52.5));
        assert_eq!(paper.fetch_free_balance("BTC").await.unwrap(), dec!(0.5));
    }
}
