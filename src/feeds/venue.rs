use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::exchange::{ExchangeAdapter, ExchangeError, ExchangeResult};
use crate::config::ExchangeConfig;
use crate::models::candle::Candle;
use crate::models::order::{OrderAck, OrderSide, OrderType};
use crate::models::quote::{split_symbol, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    Binance,
    Kraken,
    Coinbase,
    Bitfinex,
}

impl VenueKind {
    pub fn id(&self) -> &'static str {
        match self {
            VenueKind::Binance => "binance",
            VenueKind::Kraken => "kraken",
            VenueKind::Coinbase => "coinbase",
            VenueKind::Bitfinex => "bitfinex",
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "binance" => Some(VenueKind::Binance),
            "kraken" => Some(VenueKind::Kraken),
            "coinbase" | "coinbasepro" => Some(VenueKind::Coinbase),
            "bitfinex" => Some(VenueKind::Bitfinex),
            _ => None,
        }
    }

    /// Venue-native market id for `BASE/QUOTE`.
    pub fn market_id(&self, symbol: &str) -> ExchangeResult<String> {
        let (base, quote) =
            split_symbol(symbol).ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        let (base, quote) = (base.to_uppercase(), quote.to_uppercase());
        Ok(match self {
            VenueKind::Binance => format!("{base}{quote}"),
            VenueKind::Kraken => {
                let base = if base == "BTC" { "XBT".to_string() } else { base };
                format!("{base}{quote}")
            }
            VenueKind::Coinbase => format!("{base}-{quote}"),
            VenueKind::Bitfinex => {
                let quote = if quote == "USDT" { "UST".to_string() } else { quote };
                format!("t{base}{quote}")
            }
        })
    }
}

/// Minutes in a `15m` / `1h` / `1d` style interval.
pub fn interval_minutes(interval: &str) -> Option<u32> {
    let interval = interval.trim();
    let split = interval.len().checked_sub(1)?;
    let (n, unit) = interval.split_at(split);
    let n: u32 = n.parse().ok()?;
    match unit {
        "m" => Some(n),
        "h" => Some(n * 60),
        "d" => Some(n * 60 * 24),
        _ => None,
    }
}

#[derive(Clone)]
struct Credentials {
    api_key: String,
    secret: String,
}

/// Public REST market data for the supported venues, plus signed Binance trading.
pub struct RestVenue {
    kind: VenueKind,
    base_url: String,
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl RestVenue {
    pub fn new(kind: VenueKind, base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, api_key: &str, secret: &str) -> Self {
        if !api_key.is_empty() && !secret.is_empty() {
            self.credentials = Some(Credentials {
                api_key: api_key.to_string(),
                secret: secret.to_string(),
            });
        }
        self
    }

    pub fn kind(&self) -> VenueKind {
        self.kind
    }

    /// Build every configured arbitrage venue. Unknown names are skipped with a warning.
    pub fn from_config(config: &ExchangeConfig) -> anyhow::Result<Vec<Arc<dyn ExchangeAdapter>>> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut venues: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();
        for name in &config.arbitrage_venues {
            let Some(kind) = VenueKind::parse(name) else {
                warn!("Unknown exchange '{name}', skipping");
                continue;
            };
            venues.push(Arc::new(Self::for_kind(kind, config, timeout)?));
            info!("Exchange {} initialized", kind.id());
        }
        Ok(venues)
    }

    /// The venue the signal bot trades on.
    pub fn binance(config: &ExchangeConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        Self::for_kind(VenueKind::Binance, config, timeout)
    }

    fn for_kind(kind: VenueKind, config: &ExchangeConfig, timeout: Duration) -> anyhow::Result<Self> {
        let url = match kind {
            VenueKind::Binance => &config.binance_rest_url,
            VenueKind::Kraken => &config.kraken_rest_url,
            VenueKind::Coinbase => &config.coinbase_rest_url,
            VenueKind::Bitfinex => &config.bitfinex_rest_url,
        };
        let venue = Self::new(kind, url.clone(), timeout)?;
        Ok(match kind {
            VenueKind::Binance => {
                venue.with_credentials(&config.binance_api_key, &config.binance_secret_key)
            }
            _ => venue,
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> ExchangeResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ExchangeError::decode("url", e))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> ExchangeResult<Value> {
        debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .header("User-Agent", "autoprofit/0.1")
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn read_json(resp: reqwest::Response) -> ExchangeResult<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }

    fn credentials(&self) -> ExchangeResult<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::MissingCredentials {
                venue: self.kind.id().to_string(),
            })
    }

    fn require_binance(&self, operation: &'static str) -> ExchangeResult<()> {
        if self.kind == VenueKind::Binance {
            Ok(())
        } else {
            Err(ExchangeError::Unsupported {
                venue: self.kind.id().to_string(),
                operation,
            })
        }
    }

    /// Signed Binance request: HMAC-SHA256 over the urlencoded parameters.
    async fn binance_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> ExchangeResult<Value> {
        let creds = self.credentials()?;
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        params.push(("recvWindow", "5000".to_string()));

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        let signature = hex::encode(hmac_sha256(creds.secret.as_bytes(), query.as_bytes()));

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        let resp = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> ExchangeResult<OrderAck> {
        self.require_binance("order placement")?;
        let market = self.kind.market_id(symbol)?;
        let mut params = vec![
            ("symbol", market),
            ("side", side.as_str().to_string()),
            ("quantity", amount.normalize().to_string()),
        ];
        match (order_type, price) {
            (OrderType::Limit, Some(p)) => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", p.normalize().to_string()));
            }
            (OrderType::Limit, None) => {
                return Err(ExchangeError::Rejected("limit order without price".into()))
            }
            (OrderType::Market, _) => params.push(("type", "MARKET".to_string())),
        }

        let body = self
            .binance_signed(reqwest::Method::POST, "/api/v3/order", params)
            .await?;
        let order_id = match &body["orderId"] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Err(ExchangeError::decode("order ack", body)),
        };
        let fill_price = avg_fill_price(&body).or(price);

        info!(
            "{} {} {} {} @ {:?} -> order {}",
            self.kind.id(),
            side.as_str(),
            amount,
            symbol,
            fill_price,
            order_id
        );

        Ok(OrderAck {
            order_id,
            exchange_id: self.kind.id().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type,
            amount,
            price: fill_price,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for RestVenue {
    fn id(&self) -> &str {
        self.kind.id()
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let market = self.kind.market_id(symbol)?;
        match self.kind {
            VenueKind::Binance => {
                let url = self.url("/api/v3/ticker/24hr", &[("symbol", market)])?;
                parse_binance_ticker(&self.get_json(url).await?)
            }
            VenueKind::Kraken => {
                let url = self.url("/0/public/Ticker", &[("pair", market)])?;
                parse_kraken_ticker(&self.get_json(url).await?)
            }
            VenueKind::Coinbase => {
                let url = self.url(&format!("/products/{market}/ticker"), &[])?;
                parse_coinbase_ticker(&self.get_json(url).await?)
            }
            VenueKind::Bitfinex => {
                let url = self.url(&format!("/v2/ticker/{market}"), &[])?;
                parse_bitfinex_ticker(&self.get_json(url).await?)
            }
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let market = self.kind.market_id(symbol)?;
        let minutes = interval_minutes(interval)
            .ok_or_else(|| ExchangeError::decode("interval", interval))?;
        let mut candles = match self.kind {
            VenueKind::Binance => {
                let url = self.url(
                    "/api/v3/klines",
                    &[
                        ("symbol", market),
                        ("interval", interval.to_string()),
                        ("limit", limit.min(1000).to_string()),
                    ],
                )?;
                parse_binance_klines(&self.get_json(url).await?)?
            }
            VenueKind::Kraken => {
                let url = self.url(
                    "/0/public/OHLC",
                    &[("pair", market), ("interval", minutes.to_string())],
                )?;
                parse_kraken_ohlc(&self.get_json(url).await?, minutes)?
            }
            VenueKind::Coinbase => {
                let url = self.url(
                    &format!("/products/{market}/candles"),
                    &[("granularity", (minutes * 60).to_string())],
                )?;
                parse_coinbase_candles(&self.get_json(url).await?, minutes)?
            }
            VenueKind::Bitfinex => {
                let url = self.url(
                    &format!("/v2/candles/trade:{interval}:{market}/hist"),
                    &[("limit", limit.to_string()), ("sort", "1".to_string())],
                )?;
                parse_bitfinex_candles(&self.get_json(url).await?, minutes)?
            }
        };
        candles.sort_by_key(|c| c.open_time);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn fetch_free_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        self.require_binance("balance queries")?;
        let body = self
            .binance_signed(reqwest::Method::GET, "/api/v3/account", Vec::new())
            .await?;
        let balances = body["balances"]
            .as_array()
            .ok_or_else(|| ExchangeError::decode("account", "missing balances"))?;
        Ok(balances
            .iter()
            .find(|b| b["asset"].as_str() == Some(asset))
            .and_then(|b| value_decimal(&b["free"]))
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderAck> {
        self.place_order(symbol, side, OrderType::Market, amount, None)
            .await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        self.place_order(symbol, side, OrderType::Limit, amount, Some(price))
            .await
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    // HMAC accepts keys of any length, so this never takes the fallback
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Volume-weighted fill price from a Binance order response, when fills are reported.
fn avg_fill_price(body: &Value) -> Option<Decimal> {
    let fills = body["fills"].as_array()?;
    let mut qty = Decimal::ZERO;
    let mut notional = Decimal::ZERO;
    for fill in fills {
        let p = value_decimal(&fill["price"])?;
        let q = value_decimal(&fill["qty"])?;
        qty += q;
        notional += p * q;
    }
    if qty.is_zero() {
        None
    } else {
        Some(notional / qty)
    }
}

// --- response parsing ---

/// Venues send prices as strings or JSON numbers.
fn value_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn candle_from(
    open_time: DateTime<Utc>,
    minutes: u32,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
) -> Candle {
    Candle {
        open,
        high,
        low,
        close,
        volume,
        open_time,
        close_time: open_time + chrono::Duration::minutes(minutes as i64),
    }
}

pub fn parse_binance_ticker(body: &Value) -> ExchangeResult<Ticker> {
    if !body.is_object() {
        return Err(ExchangeError::decode("binance ticker", body));
    }
    Ok(Ticker {
        bid: value_decimal(&body["bidPrice"]),
        ask: value_decimal(&body["askPrice"]),
        last: value_decimal(&body["lastPrice"]),
        volume: value_decimal(&body["volume"]),
    })
}

pub fn parse_kraken_ticker(body: &Value) -> ExchangeResult<Ticker> {
    if let Some(errors) = body["error"].as_array() {
        if !errors.is_empty() {
            return Err(ExchangeError::Rejected(format!("kraken: {errors:?}")));
        }
    }
    // Result is keyed by Kraken's own pair name, which may differ from the request
    let entry = body["result"]
        .as_object()
        .and_then(|m| m.values().next())
        .ok_or_else(|| ExchangeError::decode("kraken ticker", body))?;
    Ok(Ticker {
        bid: value_decimal(&entry["b"][0]),
        ask: value_decimal(&entry["a"][0]),
        last: value_decimal(&entry["c"][0]),
        volume: value_decimal(&entry["v"][1]),
    })
}

pub fn parse_coinbase_ticker(body: &Value) -> ExchangeResult<Ticker> {
    if !body.is_object() {
        return Err(ExchangeError::decode("coinbase ticker", body));
    }
    Ok(Ticker {
        bid: value_decimal(&body["bid"]),
        ask: value_decimal(&body["ask"]),
        last: value_decimal(&body["price"]),
        volume: value_decimal(&body["volume"]),
    })
}

/// `[BID, BID_SIZE, ASK, ASK_SIZE, CHANGE, CHANGE_PCT, LAST, VOLUME, HIGH, LOW]`
pub fn parse_bitfinex_ticker(body: &Value) -> ExchangeResult<Ticker> {
    let arr = body
        .as_array()
        .filter(|a| a.len() >= 8)
        .ok_or_else(|| ExchangeError::decode("bitfinex ticker", body))?;
    Ok(Ticker {
        bid: value_decimal(&arr[0]),
        ask: value_decimal(&arr[2]),
        last: value_decimal(&arr[6]),
        volume: value_decimal(&arr[7]),
    })
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
pub fn parse_binance_klines(body: &Value) -> ExchangeResult<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| ExchangeError::decode("binance klines", body))?;
    rows.iter()
        .map(|row| {
            let parsed = (|| {
                let open_time = millis_to_utc(row[0].as_i64()?)?;
                let close_time = millis_to_utc(row[6].as_i64()?)?;
                Some(Candle {
                    open: value_f64(&row[1])?,
                    high: value_f64(&row[2])?,
                    low: value_f64(&row[3])?,
                    close: value_f64(&row[4])?,
                    volume: value_f64(&row[5])?,
                    open_time,
                    close_time,
                })
            })();
            parsed.ok_or_else(|| ExchangeError::decode("binance kline", row))
        })
        .collect()
}

/// `[time, open, high, low, close, vwap, volume, count]`, time in seconds.
pub fn parse_kraken_ohlc(body: &Value, minutes: u32) -> ExchangeResult<Vec<Candle>> {
    let rows = body["result"]
        .as_object()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() != "last"))
        .and_then(|(_, v)| v.as_array())
        .ok_or_else(|| ExchangeError::decode("kraken ohlc", body))?;
    rows.iter()
        .map(|row| {
            let parsed = (|| {
                let open_time = millis_to_utc(row[0].as_i64()? * 1000)?;
                Some(candle_from(
                    open_time,
                    minutes,
                    value_f64(&row[1])?,
                    value_f64(&row[2])?,
                    value_f64(&row[3])?,
                    value_f64(&row[4])?,
                    value_f64(&row[6])?,
                ))
            })();
            parsed.ok_or_else(|| ExchangeError::decode("kraken candle", row))
        })
        .collect()
}

/// `[time, low, high, open, close, volume]`, newest first, time in seconds.
pub fn parse_coinbase_candles(body: &Value, minutes: u32) -> ExchangeResult<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| ExchangeError::decode("coinbase candles", body))?;
    rows.iter()
        .map(|row| {
            let parsed = (|| {
                let open_time = millis_to_utc(row[0].as_i64()? * 1000)?;
                Some(candle_from(
                    open_time,
                    minutes,
                    value_f64(&row[3])?,
                    value_f64(&row[2])?,
                    value_f64(&row[1])?,
                    value_f64(&row[4])?,
                    value_f64(&row[5])?,
                ))
            })();
            parsed.ok_or_else(|| ExchangeError::decode("coinbase candle", row))
        })
        .collect()
}

/// `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`
pub fn parse_bitfinex_candles(body: &Value, minutes: u32) -> ExchangeResult<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| ExchangeError::decode("bitfinex candles", body))?;
    rows.iter()
        .map(|row| {
            let parsed = (|| {
                let open_time = millis_to_utc(row[0].as_i64()?)?;
                Some(candle_from(
                    open_time,
                    minutes,
                    value_f64(&row[1])?,
                    value_f64(&row[3])?,
                    value_f64(&row[4])?,
                    value_f64(&row[2])?,
                    value_f64(&row[5])?,
                ))
            })();
            parsed.ok_or_else(|| ExchangeError::decode("bitfinex candle", row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_market_ids() {
        assert_eq!(VenueKind::Binance.market_id("BTC/USDT").unwrap(), "BTCUSDT");
        assert_eq!(VenueKind::Kraken.market_id("BTC/USDT").unwrap(), "XBTUSDT");
        assert_eq!(VenueKind::Coinbase.market_id("eth/usdt").unwrap(), "ETH-USDT");
        assert_eq!(VenueKind::Bitfinex.market_id("SOL/USDT").unwrap(), "tSOLUST");
        assert!(VenueKind::Binance.market_id("BTCUSDT").is_err());
    }

    #[test]
    fn test_interval_minutes() {
        assert_eq!(interval_minutes("15m"), Some(15));
        assert_eq!(interval_minutes("4h"), Some(240));
        assert_eq!(interval_minutes("1d"), Some(1440));
        assert_eq!(interval_minutes("x"), None);
        assert_eq!(interval_minutes(""), None);
    }

    #[test]
    fn test_parse_tickers() {
        let binance = json!({"bidPrice": "99.5", "askPrice": "100.5", "lastPrice": "100", "volume": "12"});
        let t = parse_binance_ticker(&binance).unwrap();
        assert_eq!(t.bid, Some(dec!(99.5)));
        assert_eq!(t.ask, Some(dec!(100.5)));

        let kraken = json!({"error": [], "result": {"XXBTZUSD": {
            "a": ["101.0", "1", "1.000"], "b": ["100.0", "2", "2.000"],
            "c": ["100.5", "0.1"], "v": ["10", "250"]
        }}});
        let t = parse_kraken_ticker(&kraken).unwrap();
        assert_eq!(t.bid, Some(dec!(100.0)));
        assert_eq!(t.volume, Some(dec!(250)));

        let bitfinex = json!([100.0, 3.0, 100.5, 2.0, 1.0, 0.01, 100.2, 5000.0, 101.0, 99.0]);
        let t = parse_bitfinex_ticker(&bitfinex).unwrap();
        assert_eq!(t.ask, Some(dec!(100.5)));
        assert_eq!(t.last, Some(dec!(100.2)));

        // Missing sides stay missing instead of becoming zero
        let coinbase = json!({"price": "100"});
        let t = parse_coinbase_ticker(&coinbase).unwrap();
        assert_eq!(t.bid, None);
        assert_eq!(t.last, Some(dec!(100)));
    }

    #[test]
    fn test_kraken_error_is_rejected() {
        let body = json!({"error": ["EQuery:Unknown asset pair"], "result": {}});
        assert!(matches!(parse_kraken_ticker(&body), Err(ExchangeError::Rejected(_))));
    }

    #[test]
    fn test_parse_candles() {
        let klines = json!([[1700000000000i64, "1", "2", "0.5", "1.5", "10", 1700000899999i64, "0", 1, "0", "0", "0"]]);
        let c = parse_binance_klines(&klines).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].close, 1.5);

        let coinbase = json!([[1700000900, 0.5, 2.0, 1.0, 1.5, 10.0], [1700000000, 0.4, 1.9, 0.9, 1.4, 9.0]]);
        let c = parse_coinbase_candles(&coinbase, 15).unwrap();
        assert_eq!(c[0].open, 1.0);
        assert_eq!(c[0].low, 0.5);

        let bitfinex = json!([[1700000000000i64, 1.0, 1.5, 2.0, 0.5, 10.0]]);
        let c = parse_bitfinex_candles(&bitfinex, 15).unwrap();
        assert_eq!(c[0].close, 1.5);
        assert_eq!(c[0].high, 2.0);
    }

    #[test]
    fn test_binance_signature_is_hex_sha256() {
        let sig = hex::encode(hmac_sha256(b"secret", b"symbol=BTCUSDT&timestamp=1"));
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_avg_fill_price() {
        let body = json!({"fills": [{"price": "100", "qty": "1"}, {"price": "102", "qty": "1"}]});
        assert_eq!(avg_fill_price(&body), Some(dec!(101)));
        assert_eq!(avg_fill_price(&json!({})), None);
    }
}
