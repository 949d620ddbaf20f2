use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchanges: ExchangeConfig,
    pub trading: TradingConfig,
    pub arbitrage: ArbitrageConfig,
    pub content: ContentConfig,
    pub telemetry: TelemetryConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub binance_api_key: String,
    pub binance_secret_key: String,
    pub binance_rest_url: String,
    pub kraken_rest_url: String,
    pub coinbase_rest_url: String,
    pub bitfinex_rest_url: String,
    pub arbitrage_venues: Vec<String>, // e.g. ["binance", "kraken", "coinbase", "bitfinex"]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub pairs: Vec<String>,
    pub risk_per_trade: Decimal,      // Fraction of balance risked per trade (e.g. 0.02)
    pub max_positions: usize,
    pub stop_loss_pct: Decimal,       // Fractional offset below entry (e.g. 0.03)
    pub take_profit_pct: Decimal,     // Fractional offset above entry (e.g. 0.06)
    pub min_balance: Decimal,         // Refuse to size below this many quote units
    pub max_balance_fraction: Decimal, // Cap on spend per order (e.g. 0.95)
    pub quote_asset: String,
    pub signal_threshold: f64,        // Strength needed to act on a signal
    pub candle_interval: String,
    pub candle_limit: usize,
    pub training_limit: usize,
    pub retrain_interval_secs: u64,
    pub trade_interval_secs: u64,
    pub monitor_interval_secs: u64,
    pub performance_log_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    pub symbols: Vec<String>,
    pub min_profit: Decimal,          // Fraction, 0.005 = 0.5%
    pub fee_allowance_pct: Decimal,   // Percentage points deducted from gross (two 0.1% taker fees)
    pub execution_threshold_pct: Decimal,
    pub min_trade_amount: Decimal,
    pub safety_factor: Decimal,
    pub scan_interval_secs: u64,
    pub product_scan_interval_secs: u64,
    pub domain_scan_interval_secs: u64,
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub long_form_model: String,
    pub topics: Vec<String>,
    pub topics_per_batch: usize,
    pub interval_secs: u64,
    pub library_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub alert_phone_number: Option<String>,
    pub alert_email: String,
    pub trade_profit_alert: f64,      // Only notify trades above this realized profit
    pub alert_on_trade: bool,
    pub alert_on_error: bool,
    pub request_timeout_secs: u64,     // Per-call limit on webhook and SMS requests
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub dry_run: bool,
    pub state_file: String,
    pub paper_starting_balance: Decimal,
    pub max_concurrent_requests: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            binance_api_key: String::new(),
            binance_secret_key: String::new(),
            binance_rest_url: "https://api.binance.com".into(),
            kraken_rest_url: "https://api.kraken.com".into(),
            coinbase_rest_url: "https://api.exchange.coinbase.com".into(),
            bitfinex_rest_url: "https://api-pub.bitfinex.com".into(),
            arbitrage_venues: vec![
                "binance".into(),
                "kraken".into(),
                "coinbase".into(),
                "bitfinex".into(),
            ],
            request_timeout_secs: 10,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            pairs: vec!["BTC/USDT".into(), "ETH/USDT".into(), "BNB/USDT".into()],
            risk_per_trade: dec!(0.02),
            max_positions: 5,
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.06),
            min_balance: dec!(10),
            max_balance_fraction: dec!(0.95),
            quote_asset: "USDT".into(),
            signal_threshold: 3.0,
            candle_interval: "15m".into(),
            candle_limit: 100,
            training_limit: 1000,
            retrain_interval_secs: 6 * 3600,
            trade_interval_secs: 60,
            monitor_interval_secs: 30,
            performance_log_capacity: 1000,
        }
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTC/USDT".into(),
                "ETH/USDT".into(),
                "BNB/USDT".into(),
                "SOL/USDT".into(),
                "ADA/USDT".into(),
            ],
            min_profit: dec!(0.005),
            fee_allowance_pct: dec!(0.2),
            execution_threshold_pct: dec!(1.0),
            min_trade_amount: dec!(0.001),
            safety_factor: dec!(0.95),
            scan_interval_secs: 10,
            product_scan_interval_secs: 3600,
            domain_scan_interval_secs: 7200,
            history_capacity: 500,
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".into(),
            chat_model: "gpt-3.5-turbo".into(),
            long_form_model: "gpt-3.5-turbo-16k".into(),
            topics: vec![
                "AI tools for business".into(),
                "cryptocurrency investing 2025".into(),
                "passive income strategies".into(),
                "dropshipping automation".into(),
                "NFT trading bots".into(),
                "stock market AI predictions".into(),
                "online course creation".into(),
                "affiliate marketing automation".into(),
                "e-commerce optimization".into(),
                "social media monetization".into(),
            ],
            topics_per_batch: 3,
            interval_secs: 3600,
            library_capacity: 100,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            alert_phone_number: None,
            alert_email: "user@example.com".into(),
            trade_profit_alert: 100.0,
            alert_on_trade: true,
            alert_on_error: true,
            request_timeout_secs: 10,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            state_file: "system_state.json".into(),
            paper_starting_balance: dec!(1000),
            max_concurrent_requests: 8,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchanges: ExchangeConfig::default(),
            trading: TradingConfig::default(),
            arbitrage: ArbitrageConfig::default(),
            content: ContentConfig::default(),
            telemetry: TelemetryConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Read a non-empty env var, ignoring `.env.example` placeholders.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.starts_with("your_"))
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Credentials:
    ///   BINANCE_API_KEY, BINANCE_SECRET_KEY: signed trading endpoints
    ///   OPENAI_API_KEY: content generation
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL: alerts
    ///   TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, TWILIO_PHONE_NUMBER, ALERT_PHONE_NUMBER: SMS
    ///
    /// Tuning (all optional):
    ///   TRADING_PAIRS, ARBITRAGE_SYMBOLS, ARBITRAGE_EXCHANGES: comma separated
    ///   RISK_PER_TRADE, STOP_LOSS_PERCENTAGE, TAKE_PROFIT_PERCENTAGE, MAX_POSITIONS
    ///   ARBITRAGE_MIN_PROFIT, UPDATE_INTERVAL, STATE_FILE, PAPER_BALANCE
    ///   EXCHANGE_TIMEOUT_SECS, NOTIFY_TIMEOUT_SECS
    ///   RUST_LOG: log filter (default: info)
    ///   DRY_RUN: "true" routes every order through the paper exchange
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        // Exchange credentials
        if let Some(key) = env_string("BINANCE_API_KEY") {
            config.exchanges.binance_api_key = key;
        }
        if let Some(secret) = env_string("BINANCE_SECRET_KEY") {
            config.exchanges.binance_secret_key = secret;
        }
        if let Some(venues) = env_list("ARBITRAGE_EXCHANGES") {
            config.exchanges.arbitrage_venues = venues;
        }
        if let Some(secs) = env_parse("EXCHANGE_TIMEOUT_SECS") {
            config.exchanges.request_timeout_secs = secs;
        }

        // Trading parameters
        if let Some(pairs) = env_list("TRADING_PAIRS") {
            config.trading.pairs = pairs;
        }
        if let Some(risk) = env_parse("RISK_PER_TRADE") {
            config.trading.risk_per_trade = risk;
        }
        if let Some(max) = env_parse("MAX_POSITIONS") {
            config.trading.max_positions = max;
        }
        if let Some(sl) = env_parse("STOP_LOSS_PERCENTAGE") {
            config.trading.stop_loss_pct = sl;
        }
        if let Some(tp) = env_parse("TAKE_PROFIT_PERCENTAGE") {
            config.trading.take_profit_pct = tp;
        }
        if let Some(secs) = env_parse("UPDATE_INTERVAL") {
            config.trading.trade_interval_secs = secs;
        }

        // Arbitrage
        if let Some(symbols) = env_list("ARBITRAGE_SYMBOLS") {
            config.arbitrage.symbols = symbols;
        }
        if let Some(min) = env_parse("ARBITRAGE_MIN_PROFIT") {
            config.arbitrage.min_profit = min;
        }

        // Content
        if let Some(key) = env_string("OPENAI_API_KEY") {
            config.content.openai_api_key = key;
        }
        if let Some(topics) = env_list("CONTENT_TOPICS") {
            config.content.topics = topics;
        }

        // Alerts
        config.telemetry.telegram_bot_token = env_string("TELEGRAM_BOT_TOKEN");
        config.telemetry.telegram_chat_id = env_string("TELEGRAM_CHAT_ID");
        config.telemetry.discord_webhook_url = env_string("DISCORD_WEBHOOK_URL");
        config.telemetry.twilio_account_sid = env_string("TWILIO_ACCOUNT_SID");
        config.telemetry.twilio_auth_token = env_string("TWILIO_AUTH_TOKEN");
        config.telemetry.twilio_from_number = env_string("TWILIO_PHONE_NUMBER");
        config.telemetry.alert_phone_number = env_string("ALERT_PHONE_NUMBER");
        if let Some(email) = env_string("ALERT_EMAIL") {
            config.telemetry.alert_email = email;
        }
        if let Some(secs) = env_parse("NOTIFY_TIMEOUT_SECS") {
            config.telemetry.request_timeout_secs = secs;
        }
        if let Some(level) = env_string("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        // Runtime
        config.runtime.dry_run = env_flag("DRY_RUN");
        if let Some(path) = env_string("STATE_FILE") {
            config.runtime.state_file = path;
        }
        if let Some(balance) = env_parse("PAPER_BALANCE") {
            config.runtime.paper_starting_balance = balance;
        }

        config
    }

    pub fn has_exchange_credentials(&self) -> bool {
        !self.exchanges.binance_api_key.is_empty() && !self.exchanges.binance_secret_key.is_empty()
    }

    /// Check if orders must go through the paper exchange.
    pub fn is_dry_run(&self) -> bool {
        self.runtime.dry_run || !self.has_exchange_credentials()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.content.openai_api_key.is_empty(),
            "OPENAI_API_KEY is not set"
        );
        if self.is_dry_run() {
            tracing::info!("Dry-run mode: skipping exchange credential validation");
        } else {
            anyhow::ensure!(
                !self.exchanges.binance_api_key.is_empty(),
                "BINANCE_API_KEY is not set (or set DRY_RUN=true)"
            );
        }

        let trading = &self.trading;
        anyhow::ensure!(
            trading.risk_per_trade > Decimal::ZERO && trading.risk_per_trade < Decimal::ONE,
            "risk_per_trade must be between 0 and 1"
        );
        anyhow::ensure!(
            trading.stop_loss_pct > Decimal::ZERO && trading.stop_loss_pct < Decimal::ONE,
            "stop_loss_pct must be between 0 and 1"
        );
        anyhow::ensure!(
            trading.take_profit_pct > Decimal::ZERO,
            "take_profit_pct must be positive"
        );
        anyhow::ensure!(trading.max_positions > 0, "max_positions must be at least 1");
        anyhow::ensure!(
            self.exchanges.arbitrage_venues.len() >= 2,
            "arbitrage needs at least two venues, got {}",
            self.exchanges.arbitrage_venues.len()
        );
        anyhow::ensure!(
            self.arbitrage.history_capacity > 0 && self.content.library_capacity > 0,
            "history capacities must be non-zero"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_trading_parameters() {
        let config = Config::default();
        assert_eq!(config.trading.stop_loss_pct, dec!(0.03));
        assert_eq!(config.trading.take_profit_pct, dec!(0.06));
        assert_eq!(config.trading.min_balance, dec!(10));
        assert_eq!(config.arbitrage.fee_allowance_pct, dec!(0.2));
        assert_eq!(config.arbitrage.min_profit, dec!(0.005));
        assert_eq!(config.trading.signal_threshold, 3.0);
    }

    #[test]
    fn test_validate_requires_openai_key() {
        let mut config = Config::default();
        config.runtime.dry_run = true;
        assert!(config.validate().is_err());

        config.content.openai_api_key = "sk-test".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_risk() {
        let mut config = Config::default();
        config.runtime.dry_run = true;
        config.content.openai_api_key = "sk-test".into();
        config.trading.stop_loss_pct = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dry_run_without_credentials() {
        let mut config = Config::default();
        assert!(config.is_dry_run());

        config.exchanges.binance_api_key = "key".into();
        config.exchanges.binance_secret_key = "secret".into();
        assert!(!config.is_dry_run());
    }
}
