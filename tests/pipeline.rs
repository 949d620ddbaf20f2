//! End-to-end runs of the service loops against in-memory venues.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use autoprofit::config::Config;
use autoprofit::content::llm::{ChatRequest, LlmClient};
use autoprofit::feeds::exchange::{CallGuard, ExchangeAdapter};
use autoprofit::feeds::paper::{PaperExchange, StaticMarket};
use autoprofit::feeds::quotes::QuoteFetcher;
use autoprofit::models::candle::Candle;
use autoprofit::models::order::{CloseReason, TradeOutcome};
use autoprofit::models::quote::Ticker;
use autoprofit::signals::arbitrage::ArbitrageEvaluator;
use autoprofit::strategies::orchestrator::Orchestrator;
use autoprofit::telemetry::alerts::Severity;
use autoprofit::telemetry::performance::SystemState;

struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn chat(&self, _request: ChatRequest) -> anyhow::Result<String> {
        Ok(r#"{"title": "canned"}"#.to_string())
    }
}

fn ticker(bid: Decimal, ask: Decimal) -> Ticker {
    Ticker {
        bid: Some(bid),
        ask: Some(ask),
        last: Some((bid + ask) / dec!(2)),
        volume: Some(dec!(1000)),
    }
}

fn flat(price: Decimal) -> Ticker {
    Ticker {
        bid: Some(price),
        ask: Some(price),
        last: Some(price),
        volume: Some(dec!(1000)),
    }
}

fn test_config(state_file: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.trading.pairs = vec!["BTC/USDT".into()];
    config.arbitrage.symbols = vec!["BTC/USDT".into()];
    config.content.topics_per_batch = 1;
    config.runtime.state_file = state_file.display().to_string();
    config.runtime.shutdown_grace_secs = 5;
    config
}

fn two_venues() -> (Arc<dyn ExchangeAdapter>, Arc<dyn ExchangeAdapter>) {
    let a: Arc<dyn ExchangeAdapter> =
        Arc::new(StaticMarket::new("a").with_ticker("BTC/USDT", ticker(dec!(99), dec!(100))));
    let b: Arc<dyn ExchangeAdapter> =
        Arc::new(StaticMarket::new("b").with_ticker("BTC/USDT", ticker(dec!(103), dec!(105))));
    (a, b)
}

#[tokio::test]
async fn best_pair_is_found_across_fetched_quotes() {
    let (a, b) = two_venues();
    let fetcher = QuoteFetcher::new(
        vec![a, b],
        CallGuard::new(4, std::time::Duration::from_secs(1)),
    );
    let quotes = fetcher.fetch_quotes("BTC/USDT").await;
    assert_eq!(quotes.len(), 2);

    let opp = ArbitrageEvaluator::new(dec!(0.005), dec!(0.2))
        .evaluate("BTC/USDT", &quotes)
        .unwrap();
    assert_eq!(opp.buy_exchange, "a");
    assert_eq!(opp.sell_exchange, "b");
    assert_eq!(opp.gross_profit_pct, dec!(3));
    assert_eq!(opp.net_profit_pct, dec!(2.8));
}

#[tokio::test]
async fn arbitrage_cycle_records_and_executes() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = two_venues();
    let a: Arc<dyn ExchangeAdapter> = Arc::new(PaperExchange::new(a, "USDT", dec!(1000)));
    let b: Arc<dyn ExchangeAdapter> =
        Arc::new(PaperExchange::new(b, "USDT", dec!(0)).with_balance("BTC", dec!(2)));
    let trading: Arc<dyn ExchangeAdapter> = Arc::new(StaticMarket::new("binance"));

    let orchestrator = Orchestrator::new(
        test_config(&dir.path().join("state.json")),
        trading,
        vec![a, b],
        Arc::new(CannedLlm),
        None,
    )
    .unwrap();
    orchestrator.arbitrage_cycle().await.unwrap();

    assert_eq!(orchestrator.opportunities().await.len(), 1);
    let executed = orchestrator.executed_arbitrage().await;
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].amount, dec!(1.9));
    assert_eq!(executed[0].profit, dec!(5.7));
    assert_eq!(orchestrator.performance().metrics().arbitrage_executions, 1);
    assert!((orchestrator.performance().total_profit() - 5.7).abs() < 1e-9);
}

#[tokio::test]
async fn stop_loss_monitor_closes_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let market = Arc::new(StaticMarket::new("binance").with_ticker("BTC/USDT", flat(dec!(100))));
    let trading: Arc<dyn ExchangeAdapter> =
        Arc::new(PaperExchange::new(market.clone(), "USDT", dec!(1000)));

    let orchestrator = Orchestrator::new(
        test_config(&dir.path().join("state.json")),
        trading,
        vec![],
        Arc::new(CannedLlm),
        None,
    )
    .unwrap();

    let opened = orchestrator.executor().buy("BTC/USDT").await;
    assert!(matches!(opened, TradeOutcome::Opened { .. }));
    let positions = orchestrator.executor().positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].stop_loss_price, dec!(97));
    assert_eq!(positions[0].take_profit_price, dec!(106));

    // a second BUY does not stack a position
    assert!(matches!(
        orchestrator.executor().buy("BTC/USDT").await,
        TradeOutcome::AlreadyOpen { .. }
    ));

    market.set_ticker("BTC/USDT", flat(dec!(95)));
    orchestrator.monitor_cycle().await.unwrap();
    assert!(orchestrator.executor().positions().is_empty());
    assert_eq!(orchestrator.performance().metrics().total_trades, 1);

    // the signal loop arriving late finds nothing to close
    assert_eq!(
        orchestrator
            .executor()
            .sell("BTC/USDT", CloseReason::Signal)
            .await,
        TradeOutcome::NoPosition {
            symbol: "BTC/USDT".into()
        }
    );
}

#[tokio::test]
async fn trading_cycle_fails_without_market_data() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        test_config(&dir.path().join("state.json")),
        Arc::new(StaticMarket::new("binance")),
        vec![],
        Arc::new(CannedLlm),
        None,
    )
    .unwrap();
    assert!(orchestrator.trading_cycle().await.is_err());
}

fn bar(close: f64) -> Candle {
    let now = chrono::Utc::now();
    Candle {
        open: close + 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
        open_time: now,
        close_time: now,
    }
}

#[tokio::test]
async fn oversold_selloff_opens_a_position() {
    let dir = tempfile::tempdir().unwrap();
    // steady decline, then a sharp last bar: RSI 0 and a close under the lower band
    let mut candles: Vec<Candle> = (0..119).map(|i| bar(300.0 - i as f64)).collect();
    candles.push(bar(172.0));
    let market = Arc::new(
        StaticMarket::new("binance")
            .with_candles("BTC/USDT", candles)
            .with_ticker("BTC/USDT", flat(dec!(172))),
    );
    let trading: Arc<dyn ExchangeAdapter> =
        Arc::new(PaperExchange::new(market, "USDT", dec!(1000)));

    let orchestrator = Orchestrator::new(
        test_config(&dir.path().join("state.json")),
        trading,
        vec![],
        Arc::new(CannedLlm),
        None,
    )
    .unwrap();
    orchestrator.trading_cycle().await.unwrap();

    let positions = orchestrator.executor().positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, "BTC/USDT");
    assert_eq!(positions[0].entry_price, dec!(172));
    assert_eq!(positions[0].stop_loss_price, dec!(166.84));

    // the next cycle sees the same signal but does not stack a second buy
    orchestrator.trading_cycle().await.unwrap();
    assert_eq!(orchestrator.executor().positions().len(), 1);
}

#[tokio::test]
async fn content_cycle_fills_library() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        test_config(&dir.path().join("state.json")),
        Arc::new(StaticMarket::new("binance")),
        vec![],
        Arc::new(CannedLlm),
        None,
    )
    .unwrap();
    orchestrator.content_cycle().await.unwrap();

    let library = orchestrator.content_library().await;
    assert_eq!(library.len(), 1);
    assert_eq!(library[0].failed_pieces(), 0);
    assert_eq!(orchestrator.performance().metrics().content_count, 1);
    // content notification plus nothing else queued
    assert_eq!(orchestrator.flush_notifications().await, 1);
}

#[tokio::test]
async fn shutdown_writes_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let previous = SystemState {
        total_profit: 25.0,
        daily_profits: [("2025-01-01".to_string(), 25.0)].into_iter().collect(),
        performance_metrics: Default::default(),
        shutdown_time: chrono::Utc::now(),
    };
    let mut metrics = previous.performance_metrics.clone();
    metrics.trading_profit = 25.0;
    let previous = SystemState {
        performance_metrics: metrics,
        ..previous
    };

    let orchestrator = Arc::new(Orchestrator::new(
        test_config(&path),
        Arc::new(StaticMarket::new("binance")),
        vec![],
        Arc::new(CannedLlm),
        Some(previous),
    )
    .unwrap());
    orchestrator.clone().run(async {}).await.unwrap();

    let saved = SystemState::load(&path).await.unwrap().unwrap();
    assert_eq!(saved.total_profit, 25.0);
    assert_eq!(saved.daily_profits.get("2025-01-01"), Some(&25.0));
}

#[tokio::test]
async fn shutdown_survives_unanswered_webhook() {
    // accepts connections and never replies
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut config = test_config(&path);
    config.telemetry.discord_webhook_url = Some(format!("http://{addr}/webhook"));
    config.telemetry.request_timeout_secs = 60;
    config.runtime.shutdown_grace_secs = 1;

    let orchestrator = Arc::new(
        Orchestrator::new(
            config,
            Arc::new(StaticMarket::new("binance")),
            vec![],
            Arc::new(CannedLlm),
            None,
        )
        .unwrap(),
    );
    orchestrator
        .notifier()
        .alert("Exchange", "binance degraded", Severity::Warning);

    let stopped = tokio::time::timeout(
        std::time::Duration::from_secs(20),
        orchestrator
            .clone()
            .run(tokio::time::sleep(std::time::Duration::from_millis(500))),
    )
    .await;
    assert!(stopped.is_ok(), "shutdown did not finish");
    stopped.unwrap().unwrap();
    assert!(SystemState::load(&path).await.unwrap().is_some());
}
